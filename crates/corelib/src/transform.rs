use crate::{Mat4, Quat, Vec3};

/// Node transform with non-uniform scale, as authored in source files.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    pub translation: Vec3,
    /// Euler angles in radians, applied about X, then Y, then Z (fixed axes).
    pub rotation_euler: Vec3,
    pub scale: Vec3,
}

impl Transform {
    #[inline]
    pub const fn identity() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation_euler: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }

    #[inline]
    pub fn from_trs(translation: Vec3, rotation_euler: Vec3, scale: Vec3) -> Self {
        Self {
            translation,
            rotation_euler,
            scale,
        }
    }

    /// Build matrix = T * R * S (column-major Mat4 per glam).
    #[inline]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation(), self.translation)
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        let r = self.rotation_euler;
        Quat::from_rotation_z(r.z) * Quat::from_rotation_y(r.y) * Quat::from_rotation_x(r.x)
    }

    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.matrix().transform_point3(p)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Uniform scale followed by translation: `p' = p * scale + translation`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedTransform {
    pub scale: f32,
    pub translation: Vec3,
}

impl NormalizedTransform {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        translation: Vec3::ZERO,
    };

    #[inline]
    pub fn apply(&self, p: Vec3) -> Vec3 {
        p * self.scale + self.translation
    }

    #[inline]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            Quat::IDENTITY,
            self.translation,
        )
    }

    /// Returns `true` when both transforms agree within `eps`.
    pub fn approx_eq(&self, other: &Self, eps: f32) -> bool {
        (self.scale - other.scale).abs() <= eps
            && self.translation.abs_diff_eq(other.translation, eps)
    }
}

impl Default for NormalizedTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
