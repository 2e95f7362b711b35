//! glTF / GLB loading on top of the `gltf` crate.
//!
//! Loading is split in two so the caller can fetch external buffers
//! asynchronously: [`parse_gltf`] reads the document and reports where each
//! buffer lives, [`GltfSource::build`] turns the document plus buffer bytes into
//! [`ParsedGeometry`] with node transforms baked into vertex positions.

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use corelib::{Mat3, Mat4, Vec3};

use crate::mesh::{
    EmbeddedMaterial, ImageSource, MaterialSlot, MeshData, MeshVertex, ParsedGeometry, Surface,
};

/// Where the bytes of one glTF buffer come from.
#[derive(Clone, Debug, PartialEq)]
pub enum BufferSource {
    /// GLB binary chunk or `data:` URI, already decoded.
    Embedded(Vec<u8>),
    /// External file, as written in the document.
    External(String),
}

pub struct GltfSource {
    gltf: ::gltf::Gltf,
}

pub fn parse_gltf(bytes: &[u8]) -> Result<GltfSource> {
    let gltf = ::gltf::Gltf::from_slice(bytes).context("Failed to parse glTF document")?;
    Ok(GltfSource { gltf })
}

/// Decodes a `data:[<mime>][;base64],<payload>` URI.
pub fn decode_data_uri(uri: &str) -> Option<Result<(Option<String>, Vec<u8>)>> {
    let rest = uri.strip_prefix("data:")?;
    let Some((header, payload)) = rest.split_once(',') else {
        return Some(Err(anyhow!("Malformed data URI")));
    };
    let (mime, is_base64) = match header.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (header, false),
    };
    let mime = (!mime.is_empty()).then(|| mime.to_owned());
    if !is_base64 {
        return Some(Ok((mime, payload.as_bytes().to_vec())));
    }
    Some(
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map(|data| (mime, data))
            .context("Invalid base64 in data URI"),
    )
}

impl GltfSource {
    /// One entry per buffer, in buffer index order.
    pub fn buffer_sources(&self) -> Result<Vec<BufferSource>> {
        self.gltf
            .buffers()
            .map(|buffer| match buffer.source() {
                ::gltf::buffer::Source::Bin => self
                    .gltf
                    .blob
                    .clone()
                    .map(BufferSource::Embedded)
                    .ok_or_else(|| anyhow!("GLB binary chunk missing")),
                ::gltf::buffer::Source::Uri(uri) => match decode_data_uri(uri) {
                    Some(decoded) => decoded.map(|(_, data)| BufferSource::Embedded(data)),
                    None => Ok(BufferSource::External(uri.to_owned())),
                },
            })
            .collect()
    }

    /// Builds surfaces from the default scene (or the first one).
    ///
    /// `buffers` must line up with [`Self::buffer_sources`].
    pub fn build(&self, buffers: &[Vec<u8>]) -> Result<ParsedGeometry> {
        if buffers.len() != self.gltf.buffers().len() {
            anyhow::bail!(
                "Expected {} glTF buffers, got {}",
                self.gltf.buffers().len(),
                buffers.len()
            );
        }
        for (buffer, data) in self.gltf.buffers().zip(buffers) {
            if data.len() < buffer.length() {
                anyhow::bail!(
                    "glTF buffer {} is {} bytes, document declares {}",
                    buffer.index(),
                    data.len(),
                    buffer.length()
                );
            }
        }

        let mut surfaces = Vec::new();
        match self.gltf.default_scene().or_else(|| self.gltf.scenes().next()) {
            Some(scene) => {
                for node in scene.nodes() {
                    visit_node(&node, Mat4::IDENTITY, buffers, &mut surfaces)?;
                }
            }
            None => {
                for mesh in self.gltf.meshes() {
                    push_mesh(&mesh, Mat4::IDENTITY, buffers, &mut surfaces)?;
                }
            }
        }
        if surfaces.is_empty() {
            anyhow::bail!("glTF contained no triangle primitives");
        }

        let materials = self
            .gltf
            .materials()
            .map(|m| embedded_material(&m, buffers))
            .collect::<Result<Vec<_>>>()?;

        Ok(ParsedGeometry {
            surfaces,
            materials,
        })
    }
}

fn visit_node(
    node: &::gltf::Node<'_>,
    parent: Mat4,
    buffers: &[Vec<u8>],
    surfaces: &mut Vec<Surface>,
) -> Result<()> {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        push_mesh(&mesh, world, buffers, surfaces)?;
    }
    for child in node.children() {
        visit_node(&child, world, buffers, surfaces)?;
    }
    Ok(())
}

fn push_mesh(
    mesh: &::gltf::Mesh<'_>,
    world: Mat4,
    buffers: &[Vec<u8>],
    surfaces: &mut Vec<Surface>,
) -> Result<()> {
    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
    let mesh_name = mesh.name().unwrap_or("mesh");

    for primitive in mesh.primitives() {
        if primitive.mode() != ::gltf::mesh::Mode::Triangles {
            log::warn!(
                "Skipping {:?} primitive {} of mesh '{}'",
                primitive.mode(),
                primitive.index(),
                mesh_name
            );
            continue;
        }
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));

        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .ok_or_else(|| anyhow!("Primitive of mesh '{}' has no POSITION", mesh_name))?
            .collect();
        let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
        let uvs: Option<Vec<[f32; 2]>> = reader
            .read_tex_coords(0)
            .map(|tc| tc.into_f32().collect());
        let has_uv = uvs.as_ref().is_some_and(|uv| uv.len() == positions.len());

        let vertices = positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let position = world.transform_point3(Vec3::from_array(*p)).to_array();
                let normal = normals
                    .as_ref()
                    .and_then(|n| n.get(i))
                    .map(|n| (normal_matrix * Vec3::from_array(*n)).normalize_or_zero().to_array())
                    .unwrap_or([0.0, 0.0, 1.0]);
                let uv = uvs
                    .as_ref()
                    .and_then(|uv| uv.get(i).copied())
                    .unwrap_or([0.0, 0.0]);
                MeshVertex::new(position, normal, uv)
            })
            .collect::<Vec<_>>();

        let count = u32::try_from(vertices.len())
            .map_err(|_| anyhow!("Too many vertices in glTF primitive (>{})", u32::MAX))?;
        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..count).collect(),
        };
        if let Some(bad) = indices.iter().find(|&&i| i >= count) {
            anyhow::bail!("Index {} out of range in mesh '{}'", bad, mesh_name);
        }

        surfaces.push(Surface {
            name: mesh_name.to_owned(),
            mesh: MeshData::new(vertices, indices),
            material: primitive
                .material()
                .index()
                .map_or(MaterialSlot::None, MaterialSlot::Embedded),
            has_uv,
        });
    }
    Ok(())
}

fn embedded_material(
    material: &::gltf::Material<'_>,
    buffers: &[Vec<u8>],
) -> Result<EmbeddedMaterial> {
    let pbr = material.pbr_metallic_roughness();
    Ok(EmbeddedMaterial {
        name: material.name().unwrap_or("material").to_owned(),
        base_color: pbr.base_color_factor(),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        double_sided: material.double_sided(),
        base_color_image: pbr
            .base_color_texture()
            .map(|info| image_source(&info.texture().source(), buffers))
            .transpose()?,
        normal_image: material
            .normal_texture()
            .map(|info| image_source(&info.texture().source(), buffers))
            .transpose()?,
    })
}

fn image_source(image: &::gltf::Image<'_>, buffers: &[Vec<u8>]) -> Result<ImageSource> {
    match image.source() {
        ::gltf::image::Source::View { view, mime_type } => {
            let data = buffers
                .get(view.buffer().index())
                .and_then(|b| b.get(view.offset()..view.offset() + view.length()))
                .ok_or_else(|| anyhow!("Image {} view out of range", image.index()))?;
            Ok(ImageSource::Bytes {
                data: data.to_vec(),
                mime_type: Some(mime_type.to_owned()),
            })
        }
        ::gltf::image::Source::Uri { uri, mime_type } => match decode_data_uri(uri) {
            Some(decoded) => {
                let (data_mime, data) = decoded?;
                Ok(ImageSource::Bytes {
                    data,
                    mime_type: data_mime.or_else(|| mime_type.map(str::to_owned)),
                })
            }
            None => Ok(ImageSource::Uri(uri.to_owned())),
        },
    }
}
