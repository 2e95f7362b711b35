//! Asset parsers over in-memory bytes (meshes, material libraries, textures).
//! Geometry loaders return [`mesh::ParsedGeometry`] in the asset's native units.

pub mod fbx;
pub mod gltf;
pub mod mesh;
pub mod mtl;
pub mod obj;
pub mod stl;
pub mod texture;
