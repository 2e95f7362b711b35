//! Attaches materials to parsed surfaces.
//!
//! A surface whose mesh lacks texture coordinates never receives a map:
//! an untextured surface reads better than a smeared one.

use std::{collections::HashMap, sync::Arc};

use asset::{
    mesh::{MaterialSlot, ParsedGeometry, Surface},
    mtl::{DirectiveKind, MaterialLibrary},
    texture::TextureData,
};

use crate::{
    bundle::{TextureFile, TextureIndex},
    material::{Material, Texture},
};

/// Parsed geometry with one material instance per surface.
#[derive(Clone, Debug, Default)]
pub struct BoundGeometry {
    pub geometry: ParsedGeometry,
    /// Parallel to `geometry.surfaces`.
    pub materials: Vec<Material>,
}

impl BoundGeometry {
    pub fn surfaces(&self) -> impl Iterator<Item = (&Surface, &Material)> {
        self.geometry.surfaces.iter().zip(&self.materials)
    }

    pub fn textured_count(&self) -> usize {
        self.materials.iter().filter(|m| m.has_maps()).count()
    }

    fn from_fn(geometry: ParsedGeometry, mut f: impl FnMut(&Surface) -> Material) -> Self {
        let materials = geometry
            .surfaces
            .iter()
            .map(|surface| {
                let mut material = f(surface);
                if !surface.has_uv && material.has_maps() {
                    log::warn!("Surface '{}' has no UVs, dropping its maps", surface.name);
                    material.strip_maps();
                }
                material
            })
            .collect();
        Self {
            geometry,
            materials,
        }
    }
}

/// Binds one diffuse image to every surface when the asset brings no
/// material document of its own.
pub struct FallbackTextureBinder;

impl FallbackTextureBinder {
    /// First allow-listed image in upload order.
    pub fn select(index: &TextureIndex) -> Option<&TextureFile> {
        index.images().next()
    }

    /// Whether any surface could show a texture at all.
    pub fn wants_texture(geometry: &ParsedGeometry) -> bool {
        geometry.surfaces.iter().any(|s| s.has_uv)
    }

    /// Surfaces with UVs get a fresh material instance carrying `diffuse`,
    /// the rest get the neutral gray.
    pub fn bind(geometry: ParsedGeometry, diffuse: Option<Texture>) -> BoundGeometry {
        BoundGeometry::from_fn(geometry, |surface| match &diffuse {
            Some(texture) if surface.has_uv => Material::textured(texture.clone()),
            _ => Material::neutral(),
        })
    }
}

/// Resolved map URLs referenced by the materials that surfaces actually use.
pub fn library_texture_urls(
    geometry: &ParsedGeometry,
    library: &MaterialLibrary,
    index: &TextureIndex,
) -> Vec<String> {
    let mut urls = Vec::new();
    for surface in geometry.surfaces.iter().filter(|s| s.has_uv) {
        let MaterialSlot::Named(name) = &surface.material else {
            continue;
        };
        let Some(def) = library.get(name) else {
            continue;
        };
        for map in &def.maps {
            if map.kind != DirectiveKind::Other && index.by_url(&map.path).is_some() {
                urls.push(map.path.clone());
            }
        }
    }
    urls
}

/// Binds MTL definitions by `usemtl` name. `textures` is keyed by URL.
pub fn bind_library(
    geometry: ParsedGeometry,
    library: &MaterialLibrary,
    textures: &HashMap<String, Arc<TextureData>>,
) -> BoundGeometry {
    BoundGeometry::from_fn(geometry, |surface| {
        let MaterialSlot::Named(name) = &surface.material else {
            return Material::neutral();
        };
        let Some(def) = library.get(name) else {
            log::warn!("Material '{}' is not defined in the material library", name);
            return Material::neutral();
        };
        let mut material = Material::from_definition(def);
        for map in &def.maps {
            if let Some(data) = textures.get(&map.path) {
                material.set_map(map.kind, Texture::for_kind(&map.path, data.clone(), map.kind));
            }
        }
        material
    })
}

/// Textures decoded for one embedded material.
#[derive(Clone, Debug, Default)]
pub struct EmbeddedTextures {
    pub base_color: Option<Texture>,
    pub normal: Option<Texture>,
}

/// Binds glTF materials. `textures` is parallel to `geometry.materials`.
pub fn bind_embedded(geometry: ParsedGeometry, textures: &[EmbeddedTextures]) -> BoundGeometry {
    let definitions = geometry.materials.clone();
    BoundGeometry::from_fn(geometry, |surface| {
        let MaterialSlot::Embedded(i) = surface.material else {
            return Material::neutral();
        };
        let Some(def) = definitions.get(i) else {
            return Material::neutral();
        };
        let mut material = Material::from_embedded(def);
        if let Some(maps) = textures.get(i) {
            material.diffuse_map = maps.base_color.clone();
            material.normal_map = maps.normal.clone();
        }
        material
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{ColorSpace, NEUTRAL_GRAY};
    use asset::{mesh::EmbeddedMaterial, mtl::load_mtl_from_str, obj::load_obj_from_str};

    fn texture(url: &str) -> Texture {
        let data = TextureData::new_rgba8(1, 1, vec![255; 4]).unwrap();
        Texture::new(url, Arc::new(data), ColorSpace::Srgb)
    }

    const TWO_PARTS: &str = "\
v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\n\
o textured\nusemtl wood\nf 1/1 2/2 3/3\n\
o bare\nusemtl wood\nf 1 2 3\n";

    #[test]
    fn fallback_skips_surfaces_without_uvs() {
        let geometry = load_obj_from_str(TWO_PARTS).unwrap().geometry;
        let bound = FallbackTextureBinder::bind(geometry, Some(texture("/t/wood.png")));
        assert_eq!(bound.materials.len(), 2);
        assert!(bound.materials[0].diffuse_map.is_some());
        assert!(bound.materials[1].diffuse_map.is_none());
        assert_eq!(bound.materials[1].color, NEUTRAL_GRAY);
        assert_eq!(bound.textured_count(), 1);
    }

    #[test]
    fn fallback_picks_first_image_in_upload_order() {
        let index = TextureIndex::new(&[
            TextureFile::new("readme.txt", "r"),
            TextureFile::new("b.TGA", "b"),
            TextureFile::new("a.png", "a"),
        ]);
        assert_eq!(FallbackTextureBinder::select(&index).map(|f| f.url.as_str()), Some("b"));
        assert!(FallbackTextureBinder::select(&TextureIndex::default()).is_none());
    }

    #[test]
    fn library_binding_uses_resolved_maps_only() {
        let geometry = load_obj_from_str(TWO_PARTS).unwrap().geometry;
        let library =
            load_mtl_from_str("newmtl wood\nKd 1 0.5 0\nmap_Kd /t/wood.png\nmap_bump old/n.png\n")
                .unwrap();
        let index = TextureIndex::new(&[TextureFile::new("wood.png", "/t/wood.png")]);

        let urls = library_texture_urls(&geometry, &library, &index);
        assert_eq!(urls, ["/t/wood.png"]);

        let mut textures = HashMap::new();
        textures.insert("/t/wood.png".to_owned(), texture("/t/wood.png").data);
        let bound = bind_library(geometry, &library, &textures);

        let first = &bound.materials[0];
        assert_eq!(first.name, "wood");
        assert_eq!(first.color, [1.0, 0.5, 0.0, 1.0]);
        assert_eq!(first.diffuse_map.as_ref().map(|t| t.color_space), Some(ColorSpace::Srgb));
        assert!(first.normal_map.is_none());
        assert!(!bound.materials[1].has_maps());
    }

    #[test]
    fn embedded_binding_follows_material_index() {
        let mut geometry = load_obj_from_str(TWO_PARTS).unwrap().geometry;
        geometry.materials.push(EmbeddedMaterial {
            name: "paint".into(),
            base_color: [0.1, 0.2, 0.3, 1.0],
            metallic: 1.0,
            roughness: 0.25,
            double_sided: false,
            base_color_image: None,
            normal_image: None,
        });
        geometry.surfaces[0].material = MaterialSlot::Embedded(0);
        geometry.surfaces[1].material = MaterialSlot::Embedded(3);

        let maps = [EmbeddedTextures {
            base_color: Some(texture("img.png")),
            normal: None,
        }];
        let bound = bind_embedded(geometry, &maps);
        assert_eq!(bound.materials[0].metalness, 1.0);
        assert!(!bound.materials[0].double_sided);
        assert!(bound.materials[0].diffuse_map.is_some());
        assert_eq!(bound.materials[1].color, NEUTRAL_GRAY);
    }
}
