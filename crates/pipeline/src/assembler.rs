//! Final scene handed to the renderer.

use asset::mesh::MeshData;
use corelib::{bounds::Aabb, camera::CameraFraming, transform::NormalizedTransform};

use crate::{binder::BoundGeometry, material::Material, normalizer};

/// A material directive whose texture was not part of the bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnresolvedTextureWarning {
    pub directive: String,
    pub raw_path: String,
}

#[derive(Clone, Debug)]
pub struct SceneSurface {
    pub name: String,
    pub mesh: MeshData,
    pub material: Material,
    pub has_uv: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

/// Root of the normalized scene. Positions are in source units; the
/// node transform maps them into the canonical frame.
#[derive(Clone, Debug)]
pub struct SceneNode {
    pub transform: NormalizedTransform,
    pub surfaces: Vec<SceneSurface>,
}

#[derive(Clone, Debug)]
pub struct NormalizedScene {
    root: SceneNode,
    camera: CameraFraming,
    warnings: Vec<UnresolvedTextureWarning>,
}

impl NormalizedScene {
    pub fn root(&self) -> &SceneNode {
        &self.root
    }

    pub fn transform(&self) -> &NormalizedTransform {
        &self.root.transform
    }

    pub fn camera(&self) -> &CameraFraming {
        &self.camera
    }

    pub fn camera_distance_hint(&self) -> f32 {
        self.camera.distance
    }

    pub fn warnings(&self) -> &[UnresolvedTextureWarning] {
        &self.warnings
    }

    pub fn surfaces(&self) -> &[SceneSurface] {
        &self.root.surfaces
    }

    pub fn textured_surface_count(&self) -> usize {
        self.root.surfaces.iter().filter(|s| s.material.has_maps()).count()
    }

    /// Bounds after the root transform.
    pub fn world_bounds(&self) -> Aabb {
        let t = self.root.transform;
        Aabb::from_points(self.root.surfaces.iter().flat_map(|s| s.mesh.positions()))
            .scaled_translated(t.scale, t.translation)
    }
}

/// Wraps bound geometry into a scene; every surface casts and receives shadows.
pub fn assemble(
    bound: BoundGeometry,
    transform: NormalizedTransform,
    warnings: Vec<UnresolvedTextureWarning>,
) -> NormalizedScene {
    let surfaces = bound
        .geometry
        .surfaces
        .into_iter()
        .zip(bound.materials)
        .map(|(surface, material)| SceneSurface {
            name: surface.name,
            mesh: surface.mesh,
            material,
            has_uv: surface.has_uv,
            cast_shadow: true,
            receive_shadow: true,
        })
        .collect();

    NormalizedScene {
        root: SceneNode {
            transform,
            surfaces,
        },
        camera: normalizer::camera_hint(),
        warnings,
    }
}
