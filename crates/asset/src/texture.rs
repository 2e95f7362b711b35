//! Texture decoding and data structures.
//! Images are decoded from fetched bytes to RGBA8.

use anyhow::Context;

/// Texture data in CPU-friendly format before GPU upload.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Supported texture formats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextureFormat {
    Rgba8,
}

/// Filename extensions treated as images, lower-case.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tga"];

/// Returns `true` if `filename` carries an allow-listed image extension.
pub fn is_image_filename(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

fn format_hint(name: &str) -> Option<image::ImageFormat> {
    let (_, ext) = name.rsplit_once('.')?;
    image::ImageFormat::from_extension(ext)
}

impl TextureData {
    /// Create a new texture with given dimensions and RGBA8 format.
    pub fn new_rgba8(width: u32, height: u32, data: Vec<u8>) -> anyhow::Result<Self> {
        let expected = (width as usize) * (height as usize) * 4;
        if data.len() != expected {
            anyhow::bail!(
                "Data size {} doesn't match RGBA8 {}x{} ({} bytes)",
                data.len(),
                width,
                height,
                expected
            );
        }
        Ok(Self {
            data,
            width,
            height,
            format: TextureFormat::Rgba8,
        })
    }

    /// Decode an encoded image. `name` (filename or URL) is used as a
    /// format hint when the content cannot be sniffed (TGA has no magic).
    pub fn decode(bytes: &[u8], name: &str) -> anyhow::Result<Self> {
        let hint = format_hint(name);
        let format = match (hint, image::guess_format(bytes)) {
            (Some(image::ImageFormat::Tga), _) => image::ImageFormat::Tga,
            (_, Ok(sniffed)) => sniffed,
            (Some(hinted), Err(_)) => hinted,
            (None, Err(e)) => {
                return Err(e).with_context(|| format!("Unknown image format for {name}"));
            }
        };
        let img = image::load_from_memory_with_format(bytes, format)
            .with_context(|| format!("Failed to decode image {name}"))?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let data = rgba.into_raw();

        log::info!("Decoded texture {} {}x{} ({} bytes)", name, width, height, data.len());

        Self::new_rgba8(width, height, data)
    }

    /// Get the number of bytes per pixel for the format.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self.format {
            TextureFormat::Rgba8 => 4,
        }
    }

    /// Check if the texture data is valid.
    pub fn is_valid(&self) -> bool {
        let expected_size =
            (self.width as usize) * (self.height as usize) * (self.bytes_per_pixel() as usize);
        self.data.len() == expected_size && self.width > 0 && self.height > 0
    }
}
