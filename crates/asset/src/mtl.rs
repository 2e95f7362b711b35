//! MTL material libraries: texture directive tokenizer and material definitions.

use anyhow::{Context, Result};

/// Role of a texture directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Diffuse,
    Normal,
    Specular,
    Other,
}

/// Classifies an MTL statement keyword; `None` when it is not a texture map.
pub fn classify_directive(token: &str) -> Option<DirectiveKind> {
    let kind = match token.to_ascii_lowercase().as_str() {
        "map_kd" => DirectiveKind::Diffuse,
        "map_bump" | "bump" | "norm" => DirectiveKind::Normal,
        "map_ks" => DirectiveKind::Specular,
        "map_ka" | "map_ke" | "map_ns" | "map_d" | "map_tr" | "disp" | "decal" | "refl"
        | "map_pr" | "map_pm" | "map_ps" | "map_pc" | "map_pcr" | "map_pn" => DirectiveKind::Other,
        _ => return None,
    };
    Some(kind)
}

/// Splits a trimmed line into its keyword and the payload after it.
pub fn split_statement(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    let keyword = trimmed.split_whitespace().next()?;
    Some((keyword, trimmed[keyword.len()..].trim()))
}

/// One texture map in a material definition.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureMap {
    pub kind: DirectiveKind,
    pub keyword: String,
    pub path: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDefinition {
    pub name: String,
    pub diffuse_color: [f32; 3],
    pub specular_color: [f32; 3],
    pub shininess: Option<f32>,
    pub opacity: f32,
    pub maps: Vec<TextureMap>,
}

impl MaterialDefinition {
    fn new(name: String) -> Self {
        Self {
            name,
            diffuse_color: [1.0, 1.0, 1.0],
            specular_color: [0.0, 0.0, 0.0],
            shininess: None,
            opacity: 1.0,
            maps: Vec::new(),
        }
    }

    /// First map of the given kind.
    pub fn map(&self, kind: DirectiveKind) -> Option<&TextureMap> {
        self.maps.iter().find(|m| m.kind == kind)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialLibrary {
    pub materials: Vec<MaterialDefinition>,
}

impl MaterialLibrary {
    pub fn get(&self, name: &str) -> Option<&MaterialDefinition> {
        self.materials.iter().find(|m| m.name == name)
    }
}

pub fn load_mtl_from_bytes(bytes: &[u8]) -> Result<MaterialLibrary> {
    let text = std::str::from_utf8(bytes).context("MTL is not valid UTF-8")?;
    load_mtl_from_str(text)
}

pub fn load_mtl_from_str(contents: &str) -> Result<MaterialLibrary> {
    let mut materials: Vec<MaterialDefinition> = Vec::new();

    for (line_no, line) in contents.lines().enumerate() {
        let Some((keyword, payload)) = split_statement(line) else {
            continue;
        };
        if keyword.starts_with('#') {
            continue;
        }

        if keyword == "newmtl" {
            materials.push(MaterialDefinition::new(payload.to_owned()));
            continue;
        }

        // Statements before the first `newmtl` have nothing to attach to.
        let Some(current) = materials.last_mut() else {
            continue;
        };

        let line_no = line_no + 1;
        match keyword.to_ascii_lowercase().as_str() {
            "kd" => {
                if let Some(c) = parse_color(payload, line_no) {
                    current.diffuse_color = c;
                }
            }
            "ks" => {
                if let Some(c) = parse_color(payload, line_no) {
                    current.specular_color = c;
                }
            }
            "ns" => {
                if let Some(v) = parse_scalar(payload, line_no) {
                    current.shininess = Some(v);
                }
            }
            "d" => {
                // `d -halo <factor>` carries the factor after the option.
                let payload = payload.strip_prefix("-halo").unwrap_or(payload);
                if let Some(v) = parse_scalar(payload, line_no) {
                    current.opacity = v;
                }
            }
            "tr" => {
                if let Some(v) = parse_scalar(payload, line_no) {
                    current.opacity = 1.0 - v;
                }
            }
            other => {
                if let Some(kind) = classify_directive(other) {
                    current.maps.push(TextureMap {
                        kind,
                        keyword: keyword.to_owned(),
                        path: payload.to_owned(),
                    });
                }
            }
        }
    }

    Ok(MaterialLibrary { materials })
}

/// Values that do not parse keep the material default.
fn parse_scalar(payload: &str, line_no: usize) -> Option<f32> {
    let token = payload.split_whitespace().next();
    match token.map(str::parse::<f32>) {
        Some(Ok(v)) => Some(v),
        _ => {
            log::warn!("Ignoring value '{}' on MTL line {}", payload, line_no);
            None
        }
    }
}

/// `spectral` and `xyz` colors are not supported and keep the default.
fn parse_color(payload: &str, line_no: usize) -> Option<[f32; 3]> {
    let values = payload
        .split_whitespace()
        .take(3)
        .map(str::parse::<f32>)
        .collect::<Result<Vec<f32>, _>>();
    match values.as_deref() {
        Ok([r, g, b]) => Some([*r, *g, *b]),
        // A single component is a grey level.
        Ok([v]) => Some([*v, *v, *v]),
        _ => {
            log::warn!("Ignoring color '{}' on MTL line {}", payload, line_no);
            None
        }
    }
}
