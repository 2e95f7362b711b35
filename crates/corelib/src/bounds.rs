//! Axis-aligned bounding boxes.

use crate::{CoreError, CoreResult, Vec3};

/// Axis-aligned box. An empty box has `min > max` on every axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut aabb = Self::EMPTY;
        for p in points {
            aabb.extend(p);
        }
        aabb
    }

    #[inline]
    pub fn extend(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Largest side length, rejecting boxes that cannot be scaled.
    pub fn max_extent(&self) -> CoreResult<f32> {
        if self.is_empty() {
            return Err(CoreError::EmptyBounds);
        }
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err(CoreError::NonFinite);
        }
        let size = self.size();
        let extent = size.max_element();
        if !extent.is_finite() {
            return Err(CoreError::NonFinite);
        }
        if extent <= 0.0 {
            return Err(CoreError::ZeroExtent {
                size: size.to_array(),
            });
        }
        Ok(extent)
    }

    /// Image of the box under `p * scale + translation` (scale > 0).
    pub fn scaled_translated(&self, scale: f32, translation: Vec3) -> Self {
        Self::new(
            self.min * scale + translation,
            self.max * scale + translation,
        )
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}
