use glam::{IVec3, Vec3, Vec4};
use rayon::prelude::*;

use crate::camera::{CameraIntrinsics, Pose};
use crate::frame::{Image, PointMap, PreviewImage, INVALID_POINT};
use crate::map::{world_to_block, MapView};

use super::rendering_block::ZRangeMap;

/// Surface hit for one pixel, in world coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
}

/// Distance along `dir` until the ray leaves the block containing `p`
fn block_exit_distance(p: Vec3, dir: Vec3, block: IVec3, block_size: f32) -> f32 {
    let lo = block.as_vec3() * block_size;
    let hi = lo + Vec3::splat(block_size);
    let mut t = f32::INFINITY;
    for axis in 0..3 {
        let d = dir[axis];
        if d > 1e-8 {
            t = t.min((hi[axis] - p[axis]) / d);
        } else if d < -1e-8 {
            t = t.min((lo[axis] - p[axis]) / d);
        }
    }
    t.max(0.0)
}

/// March one ray between `t_near` and `t_far` (distances along the unit
/// direction) looking for a positive-to-negative TSDF crossing.
///
/// Unallocated blocks are skipped whole; inside allocated blocks the step
/// is fixed. The crossing is refined by linear interpolation between the
/// two bracketing samples.
pub fn cast_ray(
    view: &MapView<'_>,
    origin: Vec3,
    dir: Vec3,
    t_near: f32,
    t_far: f32,
    step: f32,
) -> Option<RayHit> {
    let block_size = view.block_world_size();
    let nudge = view.voxel_size * 0.01;

    let mut t = t_near;
    let mut prev: Option<(f32, f32)> = None;

    while t <= t_far {
        let p = origin + dir * t;
        let block = world_to_block(p, view.voxel_size);
        if !view.is_allocated(block) {
            prev = None;
            t += block_exit_distance(p, dir, block, block_size) + nudge;
            continue;
        }

        let Some(sdf) = view.sample_sdf(p) else {
            prev = None;
            t += step;
            continue;
        };

        if let Some((t_prev, sdf_prev)) = prev {
            if sdf_prev > 0.0 && sdf <= 0.0 {
                let t_hit = t_prev + (t - t_prev) * sdf_prev / (sdf_prev - sdf);
                let point = origin + dir * t_hit;
                let normal = view.gradient(point)?;
                let color = view.sample(point).map_or(Vec3::ZERO, |(_, c)| c);
                return Some(RayHit { point, normal, color });
            }
        }

        prev = Some((t, sdf));
        t += step;
    }
    None
}

/// Vertex, normal and preview images produced by a raycast
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub vertex_map: PointMap,
    pub normal_map: PointMap,
    pub preview: PreviewImage,
    /// Tiles that survived the rendering block capacity
    pub rendering_blocks: usize,
    pub valid_pixels: usize,
}

impl RenderOutput {
    /// Nothing rendered: every pixel invalid, preview black
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            vertex_map: Image::filled(width, height, INVALID_POINT),
            normal_map: Image::filled(width, height, INVALID_POINT),
            preview: Image::filled(width, height, [0, 0, 0, 255]),
            rendering_blocks: 0,
            valid_pixels: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.valid_pixels == 0
    }
}

/// Lambert shading with the light at the camera
fn shade(hit: &RayHit, view_dir: Vec3) -> [u8; 4] {
    let base = if hit.color.max_element() < 1.0 {
        Vec3::splat(200.0)
    } else {
        hit.color
    };
    let lambert = hit.normal.dot(-view_dir).abs().max(0.2);
    let c = (base * lambert).clamp(Vec3::ZERO, Vec3::splat(255.0));
    [c.x as u8, c.y as u8, c.z as u8, 255]
}

/// Per-pixel raymarch bounded by the z-range buffer
pub fn raycast_pixels(
    view: &MapView<'_>,
    zrange: &ZRangeMap,
    pose: &Pose,
    intrinsics: &CameraIntrinsics,
    step: f32,
) -> (PointMap, PointMap, PreviewImage, usize) {
    let width = intrinsics.width;
    let origin = pose.translation();

    let pixels: Vec<(Vec4, Vec4, [u8; 4])> = (0..intrinsics.pixel_count())
        .into_par_iter()
        .map(|i| {
            let x = (i % width as usize) as u32;
            let y = (i / width as usize) as u32;
            let miss = (INVALID_POINT, INVALID_POINT, [0, 0, 0, 255]);

            let Some((z_near, z_far)) = zrange.range_at(x, y) else {
                return miss;
            };
            // z-depth -> distance along the unit ray
            let ray = intrinsics.ray_direction(x as f32, y as f32);
            let scale = ray.length();
            let dir = pose.rotate_to_world(ray / scale);

            match cast_ray(view, origin, dir, z_near * scale, z_far * scale, step) {
                Some(hit) => (
                    hit.point.extend(1.0),
                    hit.normal.extend(0.0),
                    shade(&hit, dir),
                ),
                None => miss,
            }
        })
        .collect();

    let valid = pixels
        .iter()
        .filter(|(v, _, _)| crate::frame::is_valid_point(*v))
        .count();

    let height = intrinsics.height;
    let mut vertices = Vec::with_capacity(pixels.len());
    let mut normals = Vec::with_capacity(pixels.len());
    let mut colors = Vec::with_capacity(pixels.len());
    for (v, n, c) in pixels {
        vertices.push(v);
        normals.push(n);
        colors.push(c);
    }

    (
        Image::from_vec(width, height, vertices).unwrap_or_else(|| Image::filled(width, height, INVALID_POINT)),
        Image::from_vec(width, height, normals).unwrap_or_else(|| Image::filled(width, height, INVALID_POINT)),
        Image::from_vec(width, height, colors).unwrap_or_else(|| Image::filled(width, height, [0, 0, 0, 255])),
        valid,
    )
}
