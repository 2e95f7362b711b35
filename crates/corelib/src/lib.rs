//! Core math shared by the loaders and the pipeline: bounds, transforms, camera framing.

pub use glam::{Mat3, Mat4, Quat, Vec3, vec3};

pub mod bounds;
pub mod camera;
pub mod transform;

use thiserror::Error;

/// Side length of the canonical cube every asset is fitted into.
pub const TARGET_DIMENSION: f32 = 5.0;

#[derive(Debug, Error, PartialEq)]
pub enum CoreError {
    #[error("bounding box is empty")]
    EmptyBounds,
    #[error("bounding box has zero extent (size {size:?})")]
    ZeroExtent { size: [f32; 3] },
    #[error("bounding box is not finite")]
    NonFinite,
}

pub type CoreResult<T> = Result<T, CoreError>;
