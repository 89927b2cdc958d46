use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics plus the fixed frame resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: u32,
    pub height: u32,
    /// Raw depth units per meter (1000 for millimeter sensors)
    pub depth_scale: f32,
}

impl Default for CameraIntrinsics {
    fn default() -> Self {
        Self {
            fx: 525.0,
            fy: 525.0,
            cx: 320.0,
            cy: 240.0,
            width: 640,
            height: 480,
            depth_scale: 1000.0,
        }
    }
}

impl CameraIntrinsics {
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
            ..Default::default()
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Project a camera-space point to continuous pixel coordinates.
    /// Returns `None` for points at or behind the image plane.
    #[inline]
    pub fn project(&self, p: Vec3) -> Option<Vec2> {
        if p.z <= f32::EPSILON {
            return None;
        }
        Some(Vec2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }

    /// Project and round to the nearest pixel inside the image.
    #[inline]
    pub fn project_to_pixel(&self, p: Vec3) -> Option<(u32, u32)> {
        let uv = self.project(p)?;
        let u = (uv.x + 0.5).floor();
        let v = (uv.y + 0.5).floor();
        if u < 0.0 || v < 0.0 || u >= self.width as f32 || v >= self.height as f32 {
            return None;
        }
        Some((u as u32, v as u32))
    }

    /// Camera-space point at z-depth `depth` along the ray through pixel (u, v)
    #[inline]
    pub fn back_project(&self, u: f32, v: f32, depth: f32) -> Vec3 {
        Vec3::new(
            (u - self.cx) / self.fx * depth,
            (v - self.cy) / self.fy * depth,
            depth,
        )
    }

    /// Ray direction through pixel (u, v), scaled so that its z component is 1
    #[inline]
    pub fn ray_direction(&self, u: f32, v: f32) -> Vec3 {
        self.back_project(u, v, 1.0)
    }

    pub fn is_valid(&self) -> bool {
        self.fx > 0.0
            && self.fy > 0.0
            && self.width > 0
            && self.height > 0
            && self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
    }
}
