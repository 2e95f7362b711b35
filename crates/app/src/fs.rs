//! Local filesystem access for the CLI: a fetcher over an upload root and a
//! texture folder scanner.

use std::{
    io,
    path::{Path, PathBuf},
};

use pipeline::{FetchError, Fetcher, TextureFile};

/// Serves `file://` URLs, root-relative upload paths (`/uploads/...`, joined
/// onto `root`) and plain relative paths.
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, url: &str) -> Result<PathBuf, FetchError> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        if let Some((scheme, _)) = url.split_once("://") {
            return Err(FetchError::UnsupportedScheme(scheme.to_owned()));
        }
        Ok(self.root.join(url.trim_start_matches('/')))
    }
}

impl Fetcher for FsFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.resolve(url)?;
        log::debug!("Reading {}", path.display());
        std::fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => FetchError::NotFound(url.to_owned()),
            _ => FetchError::Io {
                url: url.to_owned(),
                source,
            },
        })
    }
}

/// Every file under `dir`, recursively, sorted by relative path so the
/// upload order is stable.
pub fn scan_texture_folder(dir: &Path) -> io::Result<Vec<TextureFile>> {
    let mut files = Vec::new();
    walk(dir, dir, &mut files)?;
    files.sort_by(|a, b| a.url.cmp(&b.url));
    Ok(files)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<TextureFile>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk(root, &path, out)?;
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        let folder_path = path
            .parent()
            .and_then(|p| p.strip_prefix(root).ok())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut file = TextureFile::new(filename, path.to_string_lossy());
        file.folder_path = folder_path;
        file.size = entry.metadata()?.len();
        out.push(file);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_urls_onto_root() {
        let fetcher = FsFetcher::new("/srv/data");
        assert_eq!(
            fetcher.resolve("/uploads/1/chair.obj").unwrap(),
            PathBuf::from("/srv/data/uploads/1/chair.obj")
        );
        assert_eq!(
            fetcher.resolve("tex/a.png").unwrap(),
            PathBuf::from("/srv/data/tex/a.png")
        );
        assert_eq!(
            fetcher.resolve("file:///tmp/x.obj").unwrap(),
            PathBuf::from("/tmp/x.obj")
        );
        assert!(matches!(
            fetcher.resolve("https://example.com/a.obj"),
            Err(FetchError::UnsupportedScheme(s)) if s == "https"
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let fetcher = FsFetcher::new(std::env::temp_dir());
        let result = pollster::block_on(fetcher.fetch("definitely-not-here-4f1c.obj"));
        assert!(matches!(result, Err(FetchError::NotFound(_))));
    }
}
