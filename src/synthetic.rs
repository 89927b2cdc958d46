//! Synthetic depth frames of analytic scenes
//!
//! Used by the demo, the benches and the integration tests to drive the
//! map without a sensor.

use glam::Vec3;
use rand::Rng;

use crate::camera::{CameraIntrinsics, Pose};
use crate::frame::{ColorFrame, DepthFrame};

/// Every pixel at the same z-depth (a plane facing the camera).
pub fn plane_depth(intrinsics: &CameraIntrinsics, distance: f32) -> DepthFrame {
    DepthFrame::filled(intrinsics.width, intrinsics.height, distance)
}

/// Depth of a sphere seen from `pose`; pixels that miss it are 0.
pub fn sphere_depth(intrinsics: &CameraIntrinsics, pose: &Pose, center: Vec3, radius: f32) -> DepthFrame {
    let c = pose.world_to_camera(center);
    let mut frame = DepthFrame::filled(intrinsics.width, intrinsics.height, 0.0);
    let width = intrinsics.width as usize;

    for (i, px) in frame.as_mut_slice().iter_mut().enumerate() {
        let u = (i % width) as f32;
        let v = (i / width) as f32;
        // z component is 1, so the ray parameter is the z-depth
        let d = intrinsics.ray_direction(u, v);
        let a = d.length_squared();
        let b = -2.0 * d.dot(c);
        let k = c.length_squared() - radius * radius;
        let disc = b * b - 4.0 * a * k;
        if disc < 0.0 {
            continue;
        }
        let t = (-b - disc.sqrt()) / (2.0 * a);
        if t > 0.0 {
            *px = t;
        }
    }
    frame
}

/// Uniform color frame matching the camera resolution.
pub fn solid_color(intrinsics: &CameraIntrinsics, rgb: [u8; 3]) -> ColorFrame {
    ColorFrame::filled(intrinsics.width, intrinsics.height, rgb)
}

/// `count` poses on a horizontal circle around `target`, all looking at it.
pub fn orbit_poses(target: Vec3, radius: f32, height: f32, count: usize) -> Vec<Pose> {
    (0..count)
        .map(|i| {
            let angle = i as f32 / count.max(1) as f32 * std::f32::consts::TAU;
            let eye = target + Vec3::new(radius * angle.cos(), height, radius * angle.sin());
            Pose::look_at(eye, target, Vec3::Y)
        })
        .collect()
}

/// Perturb every valid sample by uniform noise in [-amplitude, amplitude].
pub fn add_depth_noise<R: Rng>(frame: &mut DepthFrame, amplitude: f32, rng: &mut R) {
    if amplitude <= 0.0 {
        return;
    }
    for d in frame.as_mut_slice().iter_mut().filter(|d| **d > 0.0) {
        *d = (*d + rng.gen_range(-amplitude..amplitude)).max(0.0);
    }
}
