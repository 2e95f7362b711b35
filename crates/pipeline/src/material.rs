//! Renderer-facing materials and the textures bound to them.

use std::sync::Arc;

use asset::{
    mesh::EmbeddedMaterial,
    mtl::{DirectiveKind, MaterialDefinition},
    texture::TextureData,
};

/// Gray used for surfaces that cannot carry a texture (`#888888`).
pub const NEUTRAL_GRAY: [f32; 4] = [136.0 / 255.0, 136.0 / 255.0, 136.0 / 255.0, 1.0];
pub const DEFAULT_METALNESS: f32 = 0.2;
pub const DEFAULT_ROUGHNESS: f32 = 0.6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WrapMode {
    #[default]
    Repeat,
}

/// A decoded image bound to a material slot. Pixel data is shared between
/// every surface that uses the same file.
#[derive(Clone, Debug)]
pub struct Texture {
    pub url: String,
    pub data: Arc<TextureData>,
    pub color_space: ColorSpace,
    pub wrap: WrapMode,
    pub flip_y: bool,
}

impl Texture {
    pub fn new(url: impl Into<String>, data: Arc<TextureData>, color_space: ColorSpace) -> Self {
        Self {
            url: url.into(),
            data,
            color_space,
            wrap: WrapMode::Repeat,
            flip_y: true,
        }
    }

    /// Color maps are sRGB encoded; everything else is data.
    pub fn for_kind(url: impl Into<String>, data: Arc<TextureData>, kind: DirectiveKind) -> Self {
        let space = match kind {
            DirectiveKind::Diffuse => ColorSpace::Srgb,
            _ => ColorSpace::Linear,
        };
        Self::new(url, data, space)
    }
}

#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    pub color: [f32; 4],
    pub metalness: f32,
    pub roughness: f32,
    pub double_sided: bool,
    pub diffuse_map: Option<Texture>,
    pub normal_map: Option<Texture>,
    pub specular_map: Option<Texture>,
}

impl Material {
    /// Untextured gray.
    pub fn neutral() -> Self {
        Self {
            name: String::from("neutral"),
            color: NEUTRAL_GRAY,
            metalness: DEFAULT_METALNESS,
            roughness: DEFAULT_ROUGHNESS,
            double_sided: true,
            diffuse_map: None,
            normal_map: None,
            specular_map: None,
        }
    }

    /// White base color so the map shows unaltered.
    pub fn textured(diffuse: Texture) -> Self {
        Self {
            name: String::from("fallback"),
            color: [1.0; 4],
            diffuse_map: Some(diffuse),
            ..Self::neutral()
        }
    }

    /// Material from an MTL definition. Maps are attached by the caller.
    pub fn from_definition(def: &MaterialDefinition) -> Self {
        let [r, g, b] = def.diffuse_color;
        Self {
            name: def.name.clone(),
            color: [r, g, b, def.opacity],
            ..Self::neutral()
        }
    }

    pub fn from_embedded(def: &EmbeddedMaterial) -> Self {
        Self {
            name: def.name.clone(),
            color: def.base_color,
            metalness: def.metallic,
            roughness: def.roughness,
            double_sided: def.double_sided,
            diffuse_map: None,
            normal_map: None,
            specular_map: None,
        }
    }

    pub fn set_map(&mut self, kind: DirectiveKind, texture: Texture) {
        match kind {
            DirectiveKind::Diffuse => self.diffuse_map = Some(texture),
            DirectiveKind::Normal => self.normal_map = Some(texture),
            DirectiveKind::Specular => self.specular_map = Some(texture),
            DirectiveKind::Other => {}
        }
    }

    pub fn has_maps(&self) -> bool {
        self.diffuse_map.is_some() || self.normal_map.is_some() || self.specular_map.is_some()
    }

    /// Drops every map; used for surfaces without texture coordinates.
    pub fn strip_maps(&mut self) {
        self.diffuse_map = None;
        self.normal_map = None;
        self.specular_map = None;
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::neutral()
    }
}
