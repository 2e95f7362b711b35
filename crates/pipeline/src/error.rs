//! Error taxonomy of the normalization pipeline.

use std::fmt;

use corelib::CoreError;
use thiserror::Error;

/// Which kind of resource a failed fetch was for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Geometry,
    Material,
    Texture,
    /// External glTF buffer.
    Buffer,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Geometry => "geometry",
            Self::Material => "material",
            Self::Texture => "texture",
            Self::Buffer => "buffer",
        };
        f.write_str(name)
    }
}

/// Failure reported by a [`crate::fetch::Fetcher`], or while decoding what it returned.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("I/O error reading {url}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("could not decode: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

/// Terminal failure of one asset's pipeline.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unsupported geometry format '.{extension}' ({filename})")]
    UnsupportedFormat { filename: String, extension: String },
    #[error("failed to fetch {resource} {url}")]
    ResourceFetch {
        resource: ResourceKind,
        url: String,
        #[source]
        cause: FetchError,
    },
    #[error("geometry parse error: {0}")]
    GeometryParse(String),
    #[error("material parse error: {0}")]
    MaterialParse(String),
    #[error("asset load cancelled")]
    Cancelled,
}

impl NormalizeError {
    pub(crate) fn geometry(err: impl fmt::Display) -> Self {
        Self::GeometryParse(format!("{err:#}"))
    }

    pub(crate) fn material(err: impl fmt::Display) -> Self {
        Self::MaterialParse(format!("{err:#}"))
    }

    pub(crate) fn fetch(resource: ResourceKind, url: &str, cause: FetchError) -> Self {
        Self::ResourceFetch {
            resource,
            url: url.to_owned(),
            cause,
        }
    }
}

impl From<CoreError> for NormalizeError {
    fn from(err: CoreError) -> Self {
        Self::GeometryParse(err.to_string())
    }
}
