//! CPU-side mesh representation used by loaders.

use corelib::{Vec3, bounds::Aabb};

/// Vertex with position/normal/uv. Values are in asset space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Indexed triangle mesh with tightly-packed vertices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Returns `true` if both vertex and index buffers are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().map(|v| Vec3::from_array(v.position))
    }
}

/// Material a surface asks for, as named by its source file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MaterialSlot {
    #[default]
    None,
    /// OBJ `usemtl` name, looked up in the material library.
    Named(String),
    /// Index into [`ParsedGeometry::materials`].
    Embedded(usize),
}

/// One drawable piece of an asset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Surface {
    pub name: String,
    pub mesh: MeshData,
    pub material: MaterialSlot,
    /// Every vertex carries authored texture coordinates.
    pub has_uv: bool,
}

/// Image referenced by an embedded material.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageSource {
    /// External file, unresolved.
    Uri(String),
    /// Bytes carried inside the asset (GLB view or data URI).
    Bytes {
        data: Vec<u8>,
        mime_type: Option<String>,
    },
}

/// Material authored inside the geometry file (glTF).
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddedMaterial {
    pub name: String,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub double_sided: bool,
    pub base_color_image: Option<ImageSource>,
    pub normal_image: Option<ImageSource>,
}

/// Output of every geometry loader, in the asset's native units.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedGeometry {
    pub surfaces: Vec<Surface>,
    pub materials: Vec<EmbeddedMaterial>,
}

impl ParsedGeometry {
    pub fn from_surfaces(surfaces: Vec<Surface>) -> Self {
        Self {
            surfaces,
            materials: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.surfaces.iter().map(|s| s.mesh.vertices.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.surfaces.iter().map(|s| s.mesh.indices.len() / 3).sum()
    }

    /// Bounds over every vertex of every surface.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.surfaces.iter().flat_map(|s| s.mesh.positions()))
    }

    /// Bounds of the geometry as it would be after `p * scale`.
    pub fn scaled_bounds(&self, scale: f32) -> Aabb {
        Aabb::from_points(
            self.surfaces
                .iter()
                .flat_map(|s| s.mesh.positions())
                .map(|p| p * scale),
        )
    }

    /// Rewrites every vertex position in place.
    pub fn map_positions(&mut self, mut f: impl FnMut(Vec3) -> Vec3) {
        for surface in &mut self.surfaces {
            for v in &mut surface.mesh.vertices {
                v.position = f(Vec3::from_array(v.position)).to_array();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_data_validity() {
        let data = MeshData::new(vec![MeshVertex::default()], vec![0]);
        assert!(data.is_valid());
        assert!(!MeshData::default().is_valid());
    }

    #[test]
    fn bounds_span_all_surfaces() {
        let surface = |p: [f32; 3]| Surface {
            mesh: MeshData::new(vec![MeshVertex::new(p, [0.0; 3], [0.0; 2])], vec![0]),
            ..Default::default()
        };
        let geometry =
            ParsedGeometry::from_surfaces(vec![surface([-1.0, 0.0, 0.0]), surface([1.0, 2.0, 3.0])]);
        let b = geometry.bounds();
        assert_eq!(b.min.to_array(), [-1.0, 0.0, 0.0]);
        assert_eq!(b.max.to_array(), [1.0, 2.0, 3.0]);
        assert_eq!(geometry.scaled_bounds(2.0).max.to_array(), [2.0, 4.0, 6.0]);
    }
}
