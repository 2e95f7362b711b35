//! Bundle descriptors handed over by the storage collaborator, and the
//! filename index built from their texture folder.

use std::collections::HashMap;

use serde::Deserialize;

use crate::resolver::bare_filename;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeometryFile {
    pub filename: String,
    #[serde(alias = "path")]
    pub url: String,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaterialFile {
    pub filename: String,
    #[serde(alias = "path")]
    pub url: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextureFile {
    pub filename: String,
    #[serde(alias = "path")]
    pub url: String,
    /// Folder inside the uploaded tree; never used for matching.
    #[serde(default)]
    pub folder_path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mimetype: String,
}

impl TextureFile {
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
            folder_path: String::new(),
            size: 0,
            mimetype: String::new(),
        }
    }

    fn has_extension(&self, ext: &str) -> bool {
        self.filename
            .rsplit_once('.')
            .is_some_and(|(_, e)| e.eq_ignore_ascii_case(ext))
    }
}

/// One geometry file, an optional material document and the texture folder,
/// in upload order.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BundleDescriptor {
    #[serde(alias = "modelFile")]
    pub geometry_file: GeometryFile,
    #[serde(default, alias = "mtlFile")]
    pub material_file: Option<MaterialFile>,
    #[serde(default, alias = "textures")]
    pub texture_files: Vec<TextureFile>,
}

impl BundleDescriptor {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Prefixes root-relative URLs (`/uploads/...`) with `base`.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let absolutize = |url: &mut String| {
            if url.starts_with('/') {
                *url = format!("{base}{url}");
            }
        };
        absolutize(&mut self.geometry_file.url);
        if let Some(material) = &mut self.material_file {
            absolutize(&mut material.url);
        }
        for texture in &mut self.texture_files {
            absolutize(&mut texture.url);
        }
        self
    }
}

/// Texture folder keyed by lower-cased bare filename.
///
/// Folder paths are ignored: uploaded trees rarely mirror the paths recorded
/// in material documents. On duplicate filenames the earliest upload wins.
#[derive(Clone, Debug, Default)]
pub struct TextureIndex {
    files: Vec<TextureFile>,
    by_name: HashMap<String, usize>,
}

impl TextureIndex {
    pub fn new(files: &[TextureFile]) -> Self {
        let mut by_name = HashMap::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            by_name.entry(key(&file.filename)).or_insert(i);
        }
        Self {
            files: files.to_vec(),
            by_name,
        }
    }

    /// Case-insensitive lookup by filename; any directory prefix is ignored.
    pub fn lookup(&self, filename: &str) -> Option<&TextureFile> {
        self.by_name.get(&key(filename)).map(|&i| &self.files[i])
    }

    pub fn by_url(&self, url: &str) -> Option<&TextureFile> {
        self.files.iter().find(|f| f.url == url)
    }

    /// Entries on the image allowlist, in upload order.
    pub fn images(&self) -> impl Iterator<Item = &TextureFile> {
        self.files
            .iter()
            .filter(|f| asset::texture::is_image_filename(&f.filename))
    }

    /// `.mtl` entries, in upload order.
    pub fn material_documents(&self) -> impl Iterator<Item = &TextureFile> {
        self.files.iter().filter(|f| f.has_extension("mtl"))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn key(filename: &str) -> String {
    bare_filename(filename).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_catalog_shaped_json() {
        let json = r#"{
            "id": "b6c1",
            "name": "chair",
            "modelFile": { "filename": "chair.obj", "path": "/uploads/b6c1/chair.obj",
                           "mimetype": "model/obj", "size": 120 },
            "mtlFile": null,
            "textures": [
                { "filename": "Wood.PNG", "originalPath": "tex/Wood.PNG", "folderPath": "tex",
                  "path": "/uploads/b6c1/textures/tex/Wood.PNG", "mimetype": "image/png", "size": 9 }
            ],
            "textureCount": 1
        }"#;
        let bundle = BundleDescriptor::from_json(json)
            .expect("parse")
            .with_base_url("http://localhost:8000/");
        assert_eq!(bundle.geometry_file.url, "http://localhost:8000/uploads/b6c1/chair.obj");
        assert!(bundle.material_file.is_none());
        assert_eq!(bundle.texture_files[0].folder_path, "tex");
        assert_eq!(
            bundle.texture_files[0].url,
            "http://localhost:8000/uploads/b6c1/textures/tex/Wood.PNG"
        );
    }

    #[test]
    fn index_is_case_insensitive_and_first_wins() {
        let index = TextureIndex::new(&[
            TextureFile::new("Foo.png", "u1"),
            TextureFile::new("foo.PNG", "u2"),
            TextureFile::new("scene.MTL", "u3"),
            TextureFile::new("notes.txt", "u4"),
        ]);
        assert_eq!(index.lookup("FOO.png").map(|f| f.url.as_str()), Some("u1"));
        assert_eq!(index.lookup("a/b\\foo.png").map(|f| f.url.as_str()), Some("u1"));
        assert_eq!(index.images().count(), 2);
        assert_eq!(index.material_documents().count(), 1);
        assert_eq!(index.by_url("u4").map(|f| f.filename.as_str()), Some("notes.txt"));
        assert!(index.lookup("bar.png").is_none());
    }
}
