use crate::{Mat4, TARGET_DIMENSION, Vec3};

/// Simple perspective camera (right-handed).
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_rad: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub aspect: f32,
}

impl Camera {
    #[inline]
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    #[inline]
    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_rad,
            self.aspect.max(1e-6),
            self.z_near,
            self.z_far,
        )
    }

    #[inline]
    pub fn proj_view(&self) -> Mat4 {
        self.proj() * self.view()
    }
}

/// Where to put the camera for a normalized asset.
///
/// Depends only on [`TARGET_DIMENSION`], never on the asset's source units:
/// the orbit target sits at half height of the canonical cube and the eye
/// looks at it diagonally from twice the canonical size away.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraFraming {
    pub distance: f32,
    pub target: Vec3,
    pub eye: Vec3,
}

impl CameraFraming {
    pub const FOV_Y_DEG: f32 = 50.0;
    pub const Z_NEAR: f32 = 0.1;
    pub const Z_FAR: f32 = 1000.0;

    pub fn canonical() -> Self {
        let distance = TARGET_DIMENSION * 2.0;
        let target = Vec3::new(0.0, TARGET_DIMENSION / 2.0, 0.0);
        Self {
            distance,
            target,
            eye: target + Vec3::ONE.normalize() * distance,
        }
    }

    pub fn camera(&self, aspect: f32) -> Camera {
        Camera {
            eye: self.eye,
            target: self.target,
            up: Vec3::Y,
            fov_y_rad: Self::FOV_Y_DEG.to_radians(),
            z_near: Self::Z_NEAR,
            z_far: Self::Z_FAR,
            aspect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_framing_is_fixed() {
        let f = CameraFraming::canonical();
        assert_eq!(f.distance, 10.0);
        assert_eq!(f.target, Vec3::new(0.0, 2.5, 0.0));
        assert!((f.eye.distance(f.target) - 10.0).abs() < 1e-5);
    }

    #[test]
    fn framing_target_projects_to_screen_center() {
        let camera = CameraFraming::canonical().camera(16.0 / 9.0);
        let clip = camera.proj_view() * camera.target.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5, "{ndc:?}");
        assert!(ndc.z > 0.0 && ndc.z < 1.0, "{ndc:?}");

        let view_pos = camera.view().transform_point3(camera.target);
        assert!((view_pos.z + 10.0).abs() < 1e-4, "{view_pos:?}");
    }
}
