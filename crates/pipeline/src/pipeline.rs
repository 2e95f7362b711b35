//! Per-asset state machine driving fetch, parse, bind and normalize.

use std::{collections::HashMap, sync::Arc};

use asset::{
    fbx, gltf,
    mesh::{ImageSource, ParsedGeometry},
    mtl::{self, DirectiveKind},
    obj, stl,
    texture::TextureData,
};
use futures::future::{AbortRegistration, Abortable};
use percent_encoding::percent_decode_str;

use crate::{
    NormalizeOptions,
    assembler::{NormalizedScene, UnresolvedTextureWarning, assemble},
    binder::{self, BoundGeometry, EmbeddedTextures, FallbackTextureBinder},
    bundle::{BundleDescriptor, TextureIndex},
    dispatch::{Strategy, dispatch},
    error::{FetchError, NormalizeError, ResourceKind},
    fetch::{Fetcher, VirtualResource, fetch_all, sibling_url},
    material::Texture,
    normalizer,
    resolver::{bare_filename, resolve_material_bytes},
    state::AssetState,
};

/// Loads one bundle. Each run owns its state; nothing is shared between
/// pipelines except what the fetcher shares.
pub struct AssetPipeline<'a, F> {
    bundle: &'a BundleDescriptor,
    fetcher: &'a F,
    options: NormalizeOptions,
    state: AssetState,
}

/// Image of an embedded material, before fetching.
enum ImageRef {
    Fetch(String),
    Decoded(String, Arc<TextureData>),
}

impl<'a, F: Fetcher> AssetPipeline<'a, F> {
    pub fn new(bundle: &'a BundleDescriptor, fetcher: &'a F) -> Self {
        Self {
            bundle,
            fetcher,
            options: NormalizeOptions::default(),
            state: AssetState::Idle,
        }
    }

    pub fn with_options(mut self, options: NormalizeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> &AssetState {
        &self.state
    }

    pub async fn run(&mut self) -> Result<NormalizedScene, NormalizeError> {
        let result = self.execute().await;
        self.finish(result)
    }

    /// Like [`Self::run`], but stops at the next suspension point once the
    /// matching `AbortHandle` fires. A cancelled run yields no scene.
    pub async fn run_abortable(
        &mut self,
        registration: AbortRegistration,
    ) -> Result<NormalizedScene, NormalizeError> {
        let result = Abortable::new(self.execute(), registration)
            .await
            .unwrap_or(Err(NormalizeError::Cancelled));
        self.finish(result)
    }

    fn enter(&mut self, next: AssetState) {
        log::debug!(
            "{}: {} -> {}",
            self.bundle.geometry_file.filename,
            self.state,
            next
        );
        self.state = next;
    }

    fn finish(
        &mut self,
        result: Result<NormalizedScene, NormalizeError>,
    ) -> Result<NormalizedScene, NormalizeError> {
        let bundle = self.bundle;
        let name = &bundle.geometry_file.filename;
        match &result {
            Ok(scene) => {
                log::info!(
                    "Loaded {}: {} surfaces ({} textured), scale {:.4}",
                    name,
                    scene.surfaces().len(),
                    scene.textured_surface_count(),
                    scene.transform().scale
                );
                self.enter(AssetState::Assembled);
            }
            Err(err) => {
                log::error!("Failed to load {}: {}", name, err);
                self.enter(AssetState::Failed(err.to_string()));
            }
        }
        result
    }

    async fn execute(&mut self) -> Result<NormalizedScene, NormalizeError> {
        let bundle = self.bundle;

        self.enter(AssetState::Dispatching);
        let strategy = dispatch(&bundle.geometry_file.filename)?;
        let index = TextureIndex::new(&bundle.texture_files);
        log::debug!(
            "{} via {:?}, {} files in texture folder",
            bundle.geometry_file.filename,
            strategy,
            index.len()
        );

        self.enter(AssetState::Fetching);
        let source = self
            .fetch_one(ResourceKind::Geometry, &bundle.geometry_file.url)
            .await?;

        self.enter(AssetState::Parsing);
        let mut warnings = Vec::new();
        let bound = match strategy {
            Strategy::Obj => {
                let document = obj::load_obj_from_bytes(&source).map_err(NormalizeError::geometry)?;
                match locate_material_document(bundle, &document.material_libraries, &index) {
                    Some(material) => {
                        self.bind_material_document(document.geometry, material, &index, &mut warnings)
                            .await?
                    }
                    None => self.bind_fallback(document.geometry, &index).await?,
                }
            }
            Strategy::Fbx => {
                let geometry = fbx::load_fbx_from_bytes(&source).map_err(NormalizeError::geometry)?;
                self.bind_fallback(geometry, &index).await?
            }
            Strategy::Stl => {
                let geometry = stl::load_stl_from_bytes(&source).map_err(NormalizeError::geometry)?;
                self.bind_fallback(geometry, &index).await?
            }
            Strategy::Gltf => self.load_gltf(&source, &index, &mut warnings).await?,
        };

        self.enter(AssetState::Normalizing);
        let transform = normalizer::normalize(&bound.geometry)?;
        Ok(assemble(bound, transform, warnings))
    }

    async fn fetch_one(&self, kind: ResourceKind, url: &str) -> Result<Vec<u8>, NormalizeError> {
        self.fetcher
            .fetch(url)
            .await
            .map_err(|cause| NormalizeError::fetch(kind, url, cause))
    }

    /// Fetches and decodes textures, keyed by URL.
    async fn fetch_textures(
        &self,
        urls: impl IntoIterator<Item = String>,
    ) -> Result<HashMap<String, Arc<TextureData>>, NormalizeError> {
        let requests = urls.into_iter().map(|url| (ResourceKind::Texture, url));
        let fetched = fetch_all(self.fetcher, requests, self.options.fan_out()).await?;
        fetched
            .into_iter()
            .map(|(url, bytes)| {
                let data = decode_texture(&bytes, &url)?;
                Ok::<_, NormalizeError>((url, Arc::new(data)))
            })
            .collect()
    }

    async fn bind_material_document(
        &mut self,
        geometry: ParsedGeometry,
        (filename, url): (&str, &str),
        index: &TextureIndex,
        warnings: &mut Vec<UnresolvedTextureWarning>,
    ) -> Result<BoundGeometry, NormalizeError> {
        self.enter(AssetState::ResolvingMaterials);
        let raw = self.fetch_one(ResourceKind::Material, url).await?;
        let resolved = resolve_material_bytes(&raw, index)?;
        log::info!(
            "{}: resolved {} texture directives, {} unresolved",
            filename,
            resolved.resolved_count,
            resolved.unresolved_directives.len()
        );
        warnings.extend(
            resolved
                .unresolved_directives
                .iter()
                .map(|d| UnresolvedTextureWarning {
                    directive: d.keyword.clone(),
                    raw_path: d.raw_path_token.clone(),
                }),
        );

        // The rewritten text is the material source from here on.
        let document = VirtualResource::new(filename, resolved.rewritten_text.into_bytes());
        let library = mtl::load_mtl_from_bytes(document.bytes()).map_err(NormalizeError::material)?;
        log::debug!("{}: {} materials", document.url(), library.materials.len());

        self.enter(AssetState::Binding);
        let urls = binder::library_texture_urls(&geometry, &library, index);
        let textures = self.fetch_textures(urls).await?;
        Ok(binder::bind_library(geometry, &library, &textures))
    }

    async fn bind_fallback(
        &mut self,
        geometry: ParsedGeometry,
        index: &TextureIndex,
    ) -> Result<BoundGeometry, NormalizeError> {
        self.enter(AssetState::Binding);
        let diffuse = match FallbackTextureBinder::select(index) {
            Some(file) if FallbackTextureBinder::wants_texture(&geometry) => {
                log::info!("Binding {} as fallback diffuse map", file.filename);
                let mut textures = self.fetch_textures([file.url.clone()]).await?;
                textures
                    .remove(&file.url)
                    .map(|data| Texture::for_kind(&file.url, data, DirectiveKind::Diffuse))
            }
            Some(file) => {
                log::info!("No surface has texture coordinates, ignoring {}", file.filename);
                None
            }
            None => None,
        };
        Ok(FallbackTextureBinder::bind(geometry, diffuse))
    }

    async fn load_gltf(
        &mut self,
        source: &[u8],
        index: &TextureIndex,
        warnings: &mut Vec<UnresolvedTextureWarning>,
    ) -> Result<BoundGeometry, NormalizeError> {
        let document = gltf::parse_gltf(source).map_err(NormalizeError::geometry)?;
        let sources = document.buffer_sources().map_err(NormalizeError::geometry)?;

        let external: Vec<String> = sources
            .iter()
            .filter_map(|s| match s {
                gltf::BufferSource::External(uri) => Some(self.buffer_url(uri, index)),
                gltf::BufferSource::Embedded(_) => None,
            })
            .collect();
        if !external.is_empty() {
            self.enter(AssetState::Fetching);
        }
        let requests = external.iter().map(|url| (ResourceKind::Buffer, url.clone()));
        let fetched = fetch_all(self.fetcher, requests, self.options.fan_out()).await?;

        let buffers = sources
            .into_iter()
            .map(|s| match s {
                gltf::BufferSource::Embedded(data) => Ok(data),
                gltf::BufferSource::External(uri) => {
                    let url = self.buffer_url(&uri, index);
                    fetched.get(&url).cloned().ok_or_else(|| {
                        NormalizeError::GeometryParse(format!("buffer {uri} was not fetched"))
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.enter(AssetState::Parsing);
        let geometry = document.build(&buffers).map_err(NormalizeError::geometry)?;

        self.enter(AssetState::ResolvingMaterials);
        let label = &self.bundle.geometry_file.url;
        let mut refs = Vec::with_capacity(geometry.materials.len());
        for (i, material) in geometry.materials.iter().enumerate() {
            let base = material
                .base_color_image
                .as_ref()
                .map(|img| image_ref(img, &format!("{label}#material{i}/baseColor"), index))
                .transpose()?
                .flatten();
            let normal = material
                .normal_image
                .as_ref()
                .map(|img| image_ref(img, &format!("{label}#material{i}/normal"), index))
                .transpose()?
                .flatten();
            for (slot, image, resolved) in [
                ("baseColorTexture", &material.base_color_image, &base),
                ("normalTexture", &material.normal_image, &normal),
            ] {
                if let (Some(ImageSource::Uri(uri)), None) = (image, resolved) {
                    log::warn!("Texture not found for {} '{}'", slot, uri);
                    warnings.push(UnresolvedTextureWarning {
                        directive: slot.to_owned(),
                        raw_path: uri.clone(),
                    });
                }
            }
            refs.push((base, normal));
        }

        self.enter(AssetState::Binding);
        let urls = refs
            .iter()
            .flat_map(|(base, normal)| [base, normal])
            .filter_map(|r| match r {
                Some(ImageRef::Fetch(url)) => Some(url.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();
        let textures = self.fetch_textures(urls).await?;

        let bind = |r: Option<ImageRef>, kind: DirectiveKind| match r? {
            ImageRef::Fetch(url) => {
                let data = textures.get(&url)?.clone();
                Some(Texture::for_kind(url, data, kind))
            }
            ImageRef::Decoded(label, data) => Some(Texture::for_kind(label, data, kind)),
        };
        let maps = refs
            .into_iter()
            .map(|(base, normal)| EmbeddedTextures {
                base_color: bind(base, DirectiveKind::Diffuse),
                normal: bind(normal, DirectiveKind::Normal),
            })
            .collect::<Vec<_>>();

        Ok(binder::bind_embedded(geometry, &maps))
    }

    /// External buffers are looked up in the texture folder by filename
    /// first, then relative to the geometry file.
    fn buffer_url(&self, uri: &str, index: &TextureIndex) -> String {
        let decoded = percent_decode_str(uri).decode_utf8_lossy();
        match index.lookup(bare_filename(&decoded)) {
            Some(file) => file.url.clone(),
            None => sibling_url(&self.bundle.geometry_file.url, uri),
        }
    }
}

/// Picks the material document for an OBJ: the bundle's own, then one named
/// by `mtllib`, then `<geometry stem>.mtl`, then any `.mtl` in the folder.
fn locate_material_document<'b>(
    bundle: &'b BundleDescriptor,
    libraries: &[String],
    index: &'b TextureIndex,
) -> Option<(&'b str, &'b str)> {
    if let Some(file) = &bundle.material_file {
        return Some((file.filename.as_str(), file.url.as_str()));
    }

    let geometry_name = bare_filename(&bundle.geometry_file.filename);
    let stem = geometry_name.rsplit_once('.').map_or(geometry_name, |(stem, _)| stem);
    let wanted = libraries
        .iter()
        .map(|lib| bare_filename(lib).to_lowercase())
        .chain(std::iter::once(format!("{stem}.mtl").to_lowercase()));

    for name in wanted {
        if let Some(doc) = index
            .material_documents()
            .find(|doc| bare_filename(&doc.filename).to_lowercase() == name)
        {
            return Some((doc.filename.as_str(), doc.url.as_str()));
        }
    }
    index
        .material_documents()
        .next()
        .map(|doc| (doc.filename.as_str(), doc.url.as_str()))
}

fn image_ref(
    image: &ImageSource,
    label: &str,
    index: &TextureIndex,
) -> Result<Option<ImageRef>, NormalizeError> {
    match image {
        ImageSource::Bytes { data, mime_type } => {
            let hint = mime_type.as_deref().unwrap_or(label);
            let decoded = TextureData::decode(data, hint).map_err(|e| {
                NormalizeError::fetch(ResourceKind::Texture, label, FetchError::Decode(format!("{e:#}")))
            })?;
            Ok(Some(ImageRef::Decoded(label.to_owned(), Arc::new(decoded))))
        }
        ImageSource::Uri(uri) => {
            let decoded = percent_decode_str(uri).decode_utf8_lossy();
            Ok(index
                .lookup(bare_filename(&decoded))
                .map(|file| ImageRef::Fetch(file.url.clone())))
        }
    }
}

fn decode_texture(bytes: &[u8], url: &str) -> Result<TextureData, NormalizeError> {
    TextureData::decode(bytes, url).map_err(|e| {
        NormalizeError::fetch(ResourceKind::Texture, url, FetchError::Decode(format!("{e:#}")))
    })
}
