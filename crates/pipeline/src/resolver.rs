//! Rewrites texture-map paths in a material document to fetchable URLs.
//!
//! Paths recorded in MTL files point at the author's machine. Only the bare
//! filename survives the upload, so each map directive is matched on that,
//! case-insensitively, against the bundle's texture folder.

use asset::mtl::{DirectiveKind, classify_directive, split_statement};

use crate::{bundle::TextureIndex, error::NormalizeError};

/// A texture-map statement found in a material document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialDirective {
    pub kind: DirectiveKind,
    /// Keyword as written (`map_Kd`, `bump`, ...).
    pub keyword: String,
    /// Everything after the keyword, trimmed. May hold option flags or spaces.
    pub raw_path_token: String,
}

impl MaterialDirective {
    pub fn parse(line: &str) -> Option<Self> {
        let (keyword, payload) = split_statement(line)?;
        let kind = classify_directive(keyword)?;
        Some(Self {
            kind,
            keyword: keyword.to_owned(),
            raw_path_token: payload.to_owned(),
        })
    }

    /// Text after the last `/` or `\` of the path token.
    pub fn bare_filename(&self) -> &str {
        bare_filename(&self.raw_path_token)
    }
}

/// Result of [`resolve_material`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedMaterialDocument {
    pub rewritten_text: String,
    pub resolved_count: usize,
    /// Directives that matched nothing, in document order.
    pub unresolved_directives: Vec<MaterialDirective>,
}

impl ResolvedMaterialDocument {
    /// Raw path tokens of the unresolved directives, as written.
    pub fn unresolved_paths(&self) -> impl Iterator<Item = &str> {
        self.unresolved_directives
            .iter()
            .map(|d| d.raw_path_token.as_str())
    }
}

/// Text after the last path separator of either platform.
pub fn bare_filename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Replaces the path of every resolvable map directive with the matching
/// texture URL. Every other line, including its line ending, is kept.
pub fn resolve_material(raw_text: &str, index: &TextureIndex) -> ResolvedMaterialDocument {
    let mut out = ResolvedMaterialDocument {
        rewritten_text: String::with_capacity(raw_text.len()),
        ..Default::default()
    };

    for line in raw_text.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        let ending = &line[body.len()..];

        let Some(directive) = MaterialDirective::parse(body) else {
            out.rewritten_text.push_str(line);
            continue;
        };

        match index.lookup(directive.bare_filename()) {
            Some(texture) if !directive.raw_path_token.is_empty() => {
                log::debug!(
                    "{} {} -> {}",
                    directive.keyword,
                    directive.raw_path_token,
                    texture.url
                );
                out.rewritten_text.push_str(&directive.keyword);
                out.rewritten_text.push(' ');
                out.rewritten_text.push_str(&texture.url);
                out.rewritten_text.push_str(ending);
                out.resolved_count += 1;
            }
            _ => {
                log::warn!(
                    "Texture not found for {} '{}'",
                    directive.keyword,
                    directive.raw_path_token
                );
                out.rewritten_text.push_str(line);
                out.unresolved_directives.push(directive);
            }
        }
    }
    out
}

/// [`resolve_material`] over fetched bytes. A leading BOM is dropped.
pub fn resolve_material_bytes(
    bytes: &[u8],
    index: &TextureIndex,
) -> Result<ResolvedMaterialDocument, NormalizeError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(NormalizeError::material)?;
    Ok(resolve_material(text, index))
}
