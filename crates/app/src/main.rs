//! Entry point for meshbundle.
//! Normalizes an uploaded asset bundle from disk, or resolves a single
//! material document against a texture folder.

mod fs;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipeline::{BundleDescriptor, NormalizeOptions, TextureIndex};

use crate::fs::{FsFetcher, scan_texture_folder};

#[derive(Parser, Debug)]
#[command(name = "meshbundle", version, about = "Normalize uploaded 3D asset bundles")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a bundle manifest and print the normalized scene summary.
    Normalize {
        /// Bundle manifest (JSON).
        #[arg(long)]
        manifest: PathBuf,
        /// Directory root-relative URLs are resolved against.
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Maximum concurrent texture fetches.
        #[arg(long, default_value_t = NormalizeOptions::default().max_concurrent_fetches)]
        max_fetches: usize,
    },
    /// Rewrite texture paths of a material document and print it.
    Resolve {
        /// Material document (.mtl).
        #[arg(long)]
        material: PathBuf,
        /// Texture folder to match against.
        #[arg(long)]
        textures: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    log::debug!("{cli:?}");

    match cli.command {
        Command::Normalize {
            manifest,
            root,
            max_fetches,
        } => run_normalize(&manifest, root, max_fetches),
        Command::Resolve { material, textures } => run_resolve(&material, &textures),
    }
}

fn run_normalize(manifest: &std::path::Path, root: PathBuf, max_fetches: usize) -> Result<()> {
    let json = std::fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read manifest {}", manifest.display()))?;
    let bundle = BundleDescriptor::from_json(&json)
        .with_context(|| format!("Invalid bundle manifest {}", manifest.display()))?;

    log::info!(
        "Normalizing {} ({} texture files)",
        bundle.geometry_file.filename,
        bundle.texture_files.len()
    );

    let fetcher = FsFetcher::new(root);
    let options = NormalizeOptions {
        max_concurrent_fetches: max_fetches,
    };
    let scene = pollster::block_on(pipeline::normalize_with_options(&bundle, &fetcher, options))?;

    let transform = scene.transform();
    let bounds = scene.world_bounds();
    println!("geometry:   {}", bundle.geometry_file.filename);
    println!("surfaces:   {} ({} textured)", scene.surfaces().len(), scene.textured_surface_count());
    println!("scale:      {:.6}", transform.scale);
    println!("translation: {:?}", transform.translation.to_array());
    println!("bounds:     {:?} .. {:?}", bounds.min.to_array(), bounds.max.to_array());
    println!("camera:     eye {:?} distance {}", scene.camera().eye.to_array(), scene.camera_distance_hint());
    for surface in scene.surfaces() {
        let map = surface
            .material
            .diffuse_map
            .as_ref()
            .map_or("-", |t| t.url.as_str());
        println!(
            "  {:<24} {:>8} tris  uv={:<5} diffuse={}",
            surface.name,
            surface.mesh.indices.len() / 3,
            surface.has_uv,
            map
        );
    }
    for warning in scene.warnings() {
        println!("unresolved: {} {}", warning.directive, warning.raw_path);
    }
    Ok(())
}

fn run_resolve(material: &std::path::Path, textures: &std::path::Path) -> Result<()> {
    let files = scan_texture_folder(textures)
        .with_context(|| format!("Failed to scan {}", textures.display()))?;
    let index = TextureIndex::new(&files);
    let raw = std::fs::read(material)
        .with_context(|| format!("Failed to read {}", material.display()))?;

    let resolved = pipeline::resolve_material_bytes(&raw, &index)?;
    log::info!(
        "Resolved {} directives, {} unresolved",
        resolved.resolved_count,
        resolved.unresolved_directives.len()
    );
    print!("{}", resolved.rewritten_text);
    Ok(())
}
