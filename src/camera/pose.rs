use glam::{Mat3, Mat4, Vec3};

/// Rigid camera-to-world transform, `p_world = rotation * p_cam + translation`.
///
/// The inverse rotation is cached because every pass needs both directions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    rotation: Mat3,
    rotation_inv: Mat3,
    translation: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        rotation: Mat3::IDENTITY,
        rotation_inv: Mat3::IDENTITY,
        translation: Vec3::ZERO,
    };

    pub fn new(rotation: Mat3, translation: Vec3) -> Self {
        Self {
            rotation,
            rotation_inv: rotation.transpose(),
            translation,
        }
    }

    /// Build from a camera-to-world matrix. Scale and shear are not removed.
    pub fn from_mat4(camera_to_world: Mat4) -> Self {
        let rotation = Mat3::from_mat4(camera_to_world);
        Self::new(rotation, camera_to_world.w_axis.truncate())
    }

    /// Camera at `eye` looking at `target`, image y axis pointing along `-up`
    /// (x right, y down, z forward).
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let forward = (target - eye).normalize();
        let right = forward.cross(up).normalize();
        let down = forward.cross(right);
        Self::new(Mat3::from_cols(right, down, forward), eye)
    }

    pub fn rotation(&self) -> Mat3 {
        self.rotation
    }

    pub fn rotation_inv(&self) -> Mat3 {
        self.rotation_inv
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols(
            self.rotation.x_axis.extend(0.0),
            self.rotation.y_axis.extend(0.0),
            self.rotation.z_axis.extend(0.0),
            self.translation.extend(1.0),
        )
    }

    pub fn inverse(&self) -> Self {
        Self {
            rotation: self.rotation_inv,
            rotation_inv: self.rotation,
            translation: -(self.rotation_inv * self.translation),
        }
    }

    #[inline]
    pub fn camera_to_world(&self, p: Vec3) -> Vec3 {
        self.rotation * p + self.translation
    }

    #[inline]
    pub fn world_to_camera(&self, p: Vec3) -> Vec3 {
        self.rotation_inv * (p - self.translation)
    }

    #[inline]
    pub fn rotate_to_world(&self, dir: Vec3) -> Vec3 {
        self.rotation * dir
    }

    /// A pose with non-finite entries or a rotation that is not orthonormal.
    /// Passes skip such frames entirely.
    pub fn is_degenerate(&self) -> bool {
        let finite = self.rotation.to_cols_array().iter().all(|v| v.is_finite())
            && self.translation.is_finite();
        if !finite {
            return true;
        }
        (self.rotation.determinant() - 1.0).abs() > 1e-2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_world_camera() {
        let pose = Pose::look_at(Vec3::new(1.0, 0.5, -2.0), Vec3::ZERO, Vec3::Y);
        let p = Vec3::new(0.3, -0.2, 0.7);
        let back = pose.camera_to_world(pose.world_to_camera(p));
        assert!((back - p).length() < 1e-5);
        assert!(!pose.is_degenerate());
    }

    #[test]
    fn test_look_at_forward_axis() {
        let eye = Vec3::new(0.0, 0.0, -1.0);
        let pose = Pose::look_at(eye, Vec3::ZERO, Vec3::Y);
        let cam = pose.world_to_camera(Vec3::ZERO);
        assert!((cam - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_inverse_and_mat4() {
        let pose = Pose::look_at(Vec3::new(2.0, 1.0, 0.0), Vec3::ZERO, Vec3::Y);
        let composed = pose.to_mat4() * pose.inverse().to_mat4();
        assert!(composed.abs_diff_eq(Mat4::IDENTITY, 1e-5));
        let rebuilt = Pose::from_mat4(pose.to_mat4());
        assert!((rebuilt.translation() - pose.translation()).length() < 1e-6);
    }

    #[test]
    fn test_degenerate_pose() {
        let pose = Pose::new(Mat3::ZERO, Vec3::ZERO);
        assert!(pose.is_degenerate());
        let pose = Pose::new(Mat3::IDENTITY, Vec3::new(f32::NAN, 0.0, 0.0));
        assert!(pose.is_degenerate());
    }
}
