//! Fits any geometry into the canonical frame: largest extent
//! [`TARGET_DIMENSION`], centered on X and Z, resting on `y = 0`.

use asset::mesh::ParsedGeometry;
use corelib::{TARGET_DIMENSION, Vec3, camera::CameraFraming, transform::NormalizedTransform};

use crate::error::NormalizeError;

/// Computes the transform in two passes. The offset is measured on the
/// scaled bounds, so the composite `p * scale + translation` is exact.
pub fn normalize(geometry: &ParsedGeometry) -> Result<NormalizedTransform, NormalizeError> {
    let extent = geometry.bounds().max_extent()?;
    let scale = TARGET_DIMENSION / extent;
    if !(scale.is_finite() && scale > 0.0) {
        return Err(NormalizeError::GeometryParse(format!(
            "extent {extent:e} gives unusable scale {scale}"
        )));
    }

    let scaled = geometry.scaled_bounds(scale);
    let center = scaled.center();
    let translation = Vec3::new(-center.x, -scaled.min.y, -center.z);

    log::debug!(
        "Normalizing: extent {:.4}, scale {:.4}, offset {:?}",
        extent,
        scale,
        translation
    );
    Ok(NormalizedTransform { scale, translation })
}

/// Camera placement for the canonical frame. Independent of the asset.
pub fn camera_hint() -> CameraFraming {
    CameraFraming::canonical()
}
