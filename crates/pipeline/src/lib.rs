//! Turns an uploaded 3D asset bundle into a scene ready to render: one
//! geometry file in any supported format, its textures rebound from
//! whatever paths the authoring tool recorded, scaled and placed into a
//! canonical frame.
//!
//! ```no_run
//! # async fn demo(json: &str) -> Result<(), Box<dyn std::error::Error>> {
//! use pipeline::{BundleDescriptor, MemoryFetcher, normalize};
//!
//! let bundle = BundleDescriptor::from_json(json)?;
//! let scene = normalize(&bundle, &MemoryFetcher::new()).await?;
//! println!("{} surfaces", scene.surfaces().len());
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod binder;
pub mod bundle;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod material;
pub mod normalizer;
pub mod pipeline;
pub mod resolver;
pub mod state;

use futures::future::AbortRegistration;

pub use assembler::{NormalizedScene, SceneNode, SceneSurface, UnresolvedTextureWarning};
pub use bundle::{BundleDescriptor, GeometryFile, MaterialFile, TextureFile, TextureIndex};
pub use error::{FetchError, NormalizeError, ResourceKind};
pub use fetch::{Fetcher, MemoryFetcher, VirtualResource};
pub use pipeline::AssetPipeline;
pub use resolver::{ResolvedMaterialDocument, resolve_material, resolve_material_bytes};
pub use state::AssetState;

/// Knobs for one normalization run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Upper bound on concurrent texture and buffer fetches. Zero counts as one.
    pub max_concurrent_fetches: usize,
}

impl NormalizeOptions {
    pub(crate) fn fan_out(&self) -> usize {
        self.max_concurrent_fetches.max(1)
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
        }
    }
}

/// Loads, binds and normalizes `bundle` with default options.
pub async fn normalize<F: Fetcher>(
    bundle: &BundleDescriptor,
    fetcher: &F,
) -> Result<NormalizedScene, NormalizeError> {
    normalize_with_options(bundle, fetcher, NormalizeOptions::default()).await
}

pub async fn normalize_with_options<F: Fetcher>(
    bundle: &BundleDescriptor,
    fetcher: &F,
    options: NormalizeOptions,
) -> Result<NormalizedScene, NormalizeError> {
    AssetPipeline::new(bundle, fetcher)
        .with_options(options)
        .run()
        .await
}

/// [`normalize_with_options`] that yields [`NormalizeError::Cancelled`]
/// once the `AbortHandle` paired with `registration` fires.
pub async fn normalize_abortable<F: Fetcher>(
    bundle: &BundleDescriptor,
    fetcher: &F,
    options: NormalizeOptions,
    registration: AbortRegistration,
) -> Result<NormalizedScene, NormalizeError> {
    AssetPipeline::new(bundle, fetcher)
        .with_options(options)
        .run_abortable(registration)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::{TARGET_DIMENSION, Vec3};
    use futures::{
        executor::block_on,
        future::{AbortHandle, poll_fn},
    };
    use std::{io::Cursor, task::Poll};

    fn png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([200, 100, 50, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn bundle(geometry: &str, textures: &[(&str, &str)]) -> BundleDescriptor {
        BundleDescriptor {
            geometry_file: GeometryFile {
                filename: geometry.to_owned(),
                url: format!("/u/{geometry}"),
                mimetype: String::new(),
                size: 0,
            },
            material_file: None,
            texture_files: textures
                .iter()
                .map(|(name, url)| TextureFile::new(*name, *url))
                .collect(),
        }
    }

    const CHAIR_OBJ: &str = "\
mtllib chair.mtl
v 0 0 0
v 4 0 0
v 0 2 1
vt 0 0
vt 1 0
vt 0 1
usemtl wood
f 1/1 2/2 3/3
";

    const CHAIR_MTL: &str = "\
newmtl wood
Kd 1 1 1
map_Kd C:\\Users\\me\\tex\\Wood.PNG
map_bump missing_n.png
";

    fn assert_canonical(scene: &NormalizedScene) {
        let b = scene.world_bounds();
        assert!(b.min.y.abs() < 1e-5, "{b:?}");
        assert!(((b.min.x + b.max.x) / 2.0).abs() < 1e-5, "{b:?}");
        assert!(((b.min.z + b.max.z) / 2.0).abs() < 1e-5, "{b:?}");
        assert!((b.size().max_element() - TARGET_DIMENSION).abs() < 1e-4, "{b:?}");
    }

    #[test]
    fn obj_with_material_document_end_to_end() {
        let mut bundle = bundle("chair.obj", &[("Wood.png", "/u/textures/sub/Wood.PNG")]);
        bundle.material_file = Some(MaterialFile {
            filename: "chair.mtl".into(),
            url: "/u/chair.mtl".into(),
            size: 0,
        });
        let fetcher = MemoryFetcher::new()
            .with("/u/chair.obj", CHAIR_OBJ)
            .with("/u/chair.mtl", CHAIR_MTL)
            .with("/u/textures/sub/Wood.PNG", png());

        let mut pipeline = AssetPipeline::new(&bundle, &fetcher);
        let scene = block_on(pipeline.run()).unwrap();
        assert_eq!(pipeline.state(), &AssetState::Assembled);
        assert!(pipeline.state().is_terminal());

        assert_eq!(scene.surfaces().len(), 1);
        let surface = &scene.surfaces()[0];
        assert!(surface.cast_shadow && surface.receive_shadow);
        let diffuse = surface.material.diffuse_map.as_ref().unwrap();
        assert_eq!(diffuse.url, "/u/textures/sub/Wood.PNG");
        assert_eq!((diffuse.data.width, diffuse.data.height), (2, 2));
        assert!(surface.material.normal_map.is_none());

        assert_eq!(
            scene.warnings(),
            &[UnresolvedTextureWarning {
                directive: "map_bump".into(),
                raw_path: "missing_n.png".into(),
            }]
        );
        assert!((scene.transform().scale - 1.25).abs() < 1e-6);
        assert_eq!(scene.camera_distance_hint(), 2.0 * TARGET_DIMENSION);
        assert_canonical(&scene);
        assert_eq!(fetcher.fetch_count(), 3);
    }

    #[test]
    fn material_document_found_through_mtllib() {
        let bundle = bundle(
            "model.obj",
            &[
                ("other.mtl", "/u/textures/other.mtl"),
                ("Chair.MTL", "/u/textures/Chair.MTL"),
                ("wood.png", "/u/textures/wood.png"),
            ],
        );
        let fetcher = MemoryFetcher::new()
            .with("/u/model.obj", CHAIR_OBJ)
            .with("/u/textures/Chair.MTL", CHAIR_MTL)
            .with("/u/textures/wood.png", png());

        let scene = block_on(normalize(&bundle, &fetcher)).unwrap();
        assert_eq!(scene.textured_surface_count(), 1);
        assert!(fetcher.requested().contains(&"/u/textures/Chair.MTL".to_owned()));
        assert!(!fetcher.requested().contains(&"/u/textures/other.mtl".to_owned()));
    }

    #[test]
    fn halo_and_spectral_statements_do_not_fail_the_material() {
        let bundle = bundle("chair.obj", &[("wood.png", "/u/textures/wood.png")]);
        let mtl = "\
newmtl wood
Kd 0.5 0.5 0.5
Ks spectral metal.rfl
d -halo 0.66
map_Kd wood.png
";
        let fetcher = MemoryFetcher::new()
            .with("/u/chair.obj", CHAIR_OBJ)
            .with("/u/chair.mtl", mtl)
            .with("/u/textures/wood.png", png());
        let mut bundle = bundle;
        bundle.material_file = Some(MaterialFile {
            filename: "chair.mtl".into(),
            url: "/u/chair.mtl".into(),
            size: 0,
        });

        let scene = block_on(normalize(&bundle, &fetcher)).unwrap();
        let material = &scene.surfaces()[0].material;
        assert_eq!(material.name, "wood");
        assert!((material.color[0] - 0.5).abs() < 1e-6);
        assert!((material.color[3] - 0.66).abs() < 1e-6);
        assert_eq!(
            material.diffuse_map.as_ref().map(|t| t.url.as_str()),
            Some("/u/textures/wood.png")
        );
        assert!(scene.warnings().is_empty());
    }

    #[test]
    fn fallback_texture_only_on_surfaces_with_uvs() {
        let obj = "\
v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 0 1\n\
o skin\nf 1/1 2/2 3/3\n\
o frame\nf 1 2 3\n";
        let bundle = bundle(
            "figure.obj",
            &[("notes.txt", "/u/textures/notes.txt"), ("skin.png", "/u/textures/skin.png")],
        );
        let fetcher = MemoryFetcher::new()
            .with("/u/figure.obj", obj)
            .with("/u/textures/skin.png", png());

        let scene = block_on(normalize(&bundle, &fetcher)).unwrap();
        let [skin, frame] = scene.surfaces() else {
            panic!("expected two surfaces");
        };
        assert!(skin.material.diffuse_map.is_some());
        assert!(frame.material.diffuse_map.is_none());
        assert_eq!(frame.material.color, material::NEUTRAL_GRAY);
        assert!(scene.warnings().is_empty());
    }

    #[test]
    fn stl_never_fetches_textures() {
        let stl = "\
solid part
facet normal 0 0 1
outer loop
vertex 0 0 0
vertex 10 0 0
vertex 0 10 0
endloop
endfacet
endsolid part
";
        let bundle = bundle("part.stl", &[("skin.png", "/u/textures/skin.png")]);
        let fetcher = MemoryFetcher::new().with("/u/part.stl", stl);

        let scene = block_on(normalize(&bundle, &fetcher)).unwrap();
        assert_eq!(fetcher.fetch_count(), 1);
        assert_eq!(scene.textured_surface_count(), 0);
        assert!((scene.transform().scale - 0.5).abs() < 1e-6);
        assert_canonical(&scene);
    }

    #[test]
    fn gltf_external_buffer_resolved_from_texture_folder() {
        let json = r#"{
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0, "translation": [0, 5, 0] }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "material": 0 }] }],
            "materials": [{ "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } }],
            "textures": [{ "source": 0 }],
            "images": [{ "uri": "albedo.png" }],
            "buffers": [{ "uri": "tri%20data.bin", "byteLength": 36 }],
            "bufferViews": [{ "buffer": 0, "byteLength": 36 }],
            "accessors": [{
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0, 0, 0], "max": [2, 2, 0]
            }]
        }"#;
        let bin: Vec<u8> = [0.0f32, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 0.0]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        let bundle = bundle("scene.gltf", &[("tri data.bin", "/u/textures/bin/tri data.bin")]);
        let fetcher = MemoryFetcher::new()
            .with("/u/scene.gltf", json)
            .with("/u/textures/bin/tri data.bin", bin);

        let scene = block_on(normalize(&bundle, &fetcher)).unwrap();
        assert_eq!(scene.surfaces().len(), 1);
        assert_eq!(
            scene.warnings(),
            &[UnresolvedTextureWarning {
                directive: "baseColorTexture".into(),
                raw_path: "albedo.png".into(),
            }]
        );
        assert!((scene.transform().scale - 2.5).abs() < 1e-6);
        assert_canonical(&scene);
    }

    #[test]
    fn unsupported_format_fails_before_fetching() {
        let bundle = bundle("house.blend", &[]);
        let fetcher = MemoryFetcher::new().with("/u/house.blend", b"BLENDER".to_vec());
        let mut pipeline = AssetPipeline::new(&bundle, &fetcher);

        let err = block_on(pipeline.run()).unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedFormat { ref extension, .. } if extension == "blend"));
        assert_eq!(fetcher.fetch_count(), 0);
        assert!(matches!(pipeline.state(), AssetState::Failed(_)));
        assert!(pipeline.state().is_terminal());
    }

    #[test]
    fn missing_geometry_is_a_fetch_error() {
        let bundle = bundle("gone.obj", &[]);
        let err = block_on(normalize(&bundle, &MemoryFetcher::new())).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::ResourceFetch { resource: ResourceKind::Geometry, .. }
        ));
    }

    #[test]
    fn corrupt_texture_fails_the_asset() {
        let bundle = bundle("tri.obj", &[("skin.png", "/u/textures/skin.png")]);
        let fetcher = MemoryFetcher::new()
            .with("/u/tri.obj", "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nf 1/1 2/1 3/1\n")
            .with("/u/textures/skin.png", b"not a png".to_vec());
        let err = block_on(normalize(&bundle, &fetcher)).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::ResourceFetch {
                resource: ResourceKind::Texture,
                cause: FetchError::Decode(_),
                ..
            }
        ));
    }

    #[test]
    fn degenerate_geometry_is_rejected() {
        let bundle = bundle("point.obj", &[]);
        let fetcher =
            MemoryFetcher::new().with("/u/point.obj", "v 1 1 1\nv 1 1 1\nv 1 1 1\nf 1 2 3\n");
        let err = block_on(normalize(&bundle, &fetcher)).unwrap_err();
        assert!(matches!(err, NormalizeError::GeometryParse(_)));
    }

    #[test]
    fn cancelled_before_start_fetches_nothing() {
        let bundle = bundle("chair.obj", &[]);
        let fetcher = MemoryFetcher::new().with("/u/chair.obj", CHAIR_OBJ);
        let (handle, registration) = AbortHandle::new_pair();
        handle.abort();

        let result = block_on(normalize_abortable(
            &bundle,
            &fetcher,
            NormalizeOptions::default(),
            registration,
        ));
        assert!(matches!(result, Err(NormalizeError::Cancelled)));
        assert_eq!(fetcher.fetch_count(), 0);
    }

    /// Aborts on its first fetch, then suspends once.
    struct AbortingFetcher {
        inner: MemoryFetcher,
        handle: AbortHandle,
    }

    impl Fetcher for AbortingFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            let bytes = self.inner.fetch(url).await;
            self.handle.abort();
            let mut yielded = false;
            poll_fn(|cx| {
                if yielded {
                    Poll::Ready(())
                } else {
                    yielded = true;
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            })
            .await;
            bytes
        }
    }

    #[test]
    fn cancelled_mid_flight_yields_no_scene() {
        let bundle = bundle("figure.obj", &[("skin.png", "/u/textures/skin.png")]);
        let (handle, registration) = AbortHandle::new_pair();
        let fetcher = AbortingFetcher {
            inner: MemoryFetcher::new()
                .with("/u/figure.obj", CHAIR_OBJ)
                .with("/u/textures/skin.png", png()),
            handle,
        };

        let mut pipeline = AssetPipeline::new(&bundle, &fetcher);
        let result = block_on(pipeline.run_abortable(registration));
        assert!(matches!(result, Err(NormalizeError::Cancelled)));
        assert_eq!(fetcher.inner.fetch_count(), 1);
        assert_eq!(
            pipeline.state(),
            &AssetState::Failed(NormalizeError::Cancelled.to_string())
        );
    }

    #[test]
    fn zero_fan_out_still_fetches() {
        let options = NormalizeOptions {
            max_concurrent_fetches: 0,
        };
        assert_eq!(options.fan_out(), 1);

        let bundle = bundle("figure.obj", &[("skin.png", "/u/textures/skin.png")]);
        let fetcher = MemoryFetcher::new()
            .with("/u/figure.obj", "v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0\nf 1/1 2/1 3/1\n")
            .with("/u/textures/skin.png", png());
        let scene = block_on(normalize_with_options(&bundle, &fetcher, options)).unwrap();
        assert_eq!(scene.textured_surface_count(), 1);
        assert_eq!(scene.root().transform.translation.y, 0.0);
        assert_eq!(scene.camera().target, Vec3::new(0.0, 2.5, 0.0));
    }
}
