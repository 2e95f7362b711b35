//! Geometry format selection by filename extension.

use crate::{error::NormalizeError, resolver::bare_filename};

/// Loading strategy for a geometry file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    Obj,
    Fbx,
    Stl,
    Gltf,
}

impl Strategy {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "obj" => Some(Self::Obj),
            "fbx" => Some(Self::Fbx),
            "stl" => Some(Self::Stl),
            "gltf" | "glb" => Some(Self::Gltf),
            _ => None,
        }
    }
}

/// Picks the strategy for `filename`. Fails before anything is fetched.
pub fn dispatch(filename: &str) -> Result<Strategy, NormalizeError> {
    let name = bare_filename(filename);
    let extension = name.rsplit_once('.').map_or("", |(_, ext)| ext);
    Strategy::from_extension(extension).ok_or_else(|| NormalizeError::UnsupportedFormat {
        filename: filename.to_owned(),
        extension: extension.to_ascii_lowercase(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_extensions_case_insensitively() {
        assert_eq!(dispatch("chair.OBJ").ok(), Some(Strategy::Obj));
        assert_eq!(dispatch("rig.fbx").ok(), Some(Strategy::Fbx));
        assert_eq!(dispatch("part.Stl").ok(), Some(Strategy::Stl));
        assert_eq!(dispatch("scene.gltf").ok(), Some(Strategy::Gltf));
        assert_eq!(dispatch("scene.GLB").ok(), Some(Strategy::Gltf));
        assert_eq!(dispatch("dir.v2/mesh.obj").ok(), Some(Strategy::Obj));
    }

    #[test]
    fn rejects_unknown_extensions() {
        match dispatch("house.blend") {
            Err(NormalizeError::UnsupportedFormat { extension, .. }) => {
                assert_eq!(extension, "blend")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(dispatch("README").is_err());
        assert!(dispatch("dir.obj/README").is_err());
    }
}
