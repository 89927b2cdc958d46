use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Vec2, Vec3};
use rayon::prelude::*;

use crate::camera::{CameraIntrinsics, Pose};
use crate::map::{HashTable, VisibleEntrySet};

/// Screen tile in z-range cell units (inclusive bounds) with the depth
/// interval of the block that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingBlock {
    pub upper_left: [u32; 2],
    pub lower_right: [u32; 2],
    pub z_range: [f32; 2],
}

/// Tiling parameters shared by both render stages
#[derive(Debug, Clone, Copy)]
pub struct TileLayout {
    /// Pixels per z-range cell along each axis
    pub subsample: u32,
    /// Cells per tile along each axis
    pub tile_size: u32,
    pub grid_width: u32,
    pub grid_height: u32,
}

impl TileLayout {
    pub fn new(intrinsics: &CameraIntrinsics, subsample: u32, tile_size: u32) -> Self {
        Self {
            subsample,
            tile_size,
            grid_width: intrinsics.width.div_ceil(subsample),
            grid_height: intrinsics.height.div_ceil(subsample),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.grid_width as usize * self.grid_height as usize
    }
}

/// Screen-space footprint of one block: inclusive cell bounds and depth range
fn project_block(
    coord: glam::IVec3,
    block_size: f32,
    pose: &Pose,
    intrinsics: &CameraIntrinsics,
    layout: &TileLayout,
    depth_min: f32,
) -> Option<RenderingBlock> {
    let origin = coord.as_vec3() * block_size;

    let mut lo = Vec2::splat(f32::MAX);
    let mut hi = Vec2::splat(f32::MIN);
    let mut z_lo = f32::MAX;
    let mut z_hi = f32::MIN;
    let mut clipped = false;

    for corner in 0..8u32 {
        let offset = Vec3::new(
            (corner & 1) as f32,
            ((corner >> 1) & 1) as f32,
            ((corner >> 2) & 1) as f32,
        );
        let cam = pose.world_to_camera(origin + offset * block_size);
        z_lo = z_lo.min(cam.z);
        z_hi = z_hi.max(cam.z);
        match intrinsics.project(cam) {
            Some(px) => {
                lo = lo.min(px);
                hi = hi.max(px);
            }
            None => clipped = true,
        }
    }

    if z_hi < depth_min {
        return None;
    }
    if clipped {
        // Straddles the image plane: cover the whole screen
        lo = Vec2::ZERO;
        hi = Vec2::new(intrinsics.width as f32, intrinsics.height as f32);
    }

    let sub = layout.subsample as f32;
    let ul_x = (lo.x / sub).floor().max(0.0);
    let ul_y = (lo.y / sub).floor().max(0.0);
    let lr_x = (hi.x / sub).ceil().min(layout.grid_width as f32 - 1.0);
    let lr_y = (hi.y / sub).ceil().min(layout.grid_height as f32 - 1.0);
    if ul_x > lr_x || ul_y > lr_y {
        return None;
    }

    Some(RenderingBlock {
        upper_left: [ul_x as u32, ul_y as u32],
        lower_right: [lr_x as u32, lr_y as u32],
        z_range: [z_lo.max(depth_min), z_hi],
    })
}

/// Split a footprint into tiles of at most `tile_size` cells per side
fn split_into_tiles(block: RenderingBlock, tile_size: u32) -> impl Iterator<Item = RenderingBlock> {
    let [x0, y0] = block.upper_left;
    let [x1, y1] = block.lower_right;
    (y0..=y1).step_by(tile_size as usize).flat_map(move |ty| {
        (x0..=x1).step_by(tile_size as usize).map(move |tx| RenderingBlock {
            upper_left: [tx, ty],
            lower_right: [(tx + tile_size - 1).min(x1), (ty + tile_size - 1).min(y1)],
            z_range: block.z_range,
        })
    })
}

/// Stage one: project every visible block and emit its tiles, keeping at
/// most `capacity`. Returns the kept tiles and how many were dropped.
#[allow(clippy::too_many_arguments)]
pub fn build_rendering_blocks(
    table: &HashTable,
    visible: &VisibleEntrySet,
    pose: &Pose,
    intrinsics: &CameraIntrinsics,
    layout: &TileLayout,
    block_size: f32,
    depth_min: f32,
    capacity: usize,
) -> (Vec<RenderingBlock>, usize) {
    let mut tiles: Vec<RenderingBlock> = visible
        .entries()
        .par_iter()
        .filter_map(|&entry| {
            let coord = table.entry_pos(entry);
            project_block(coord, block_size, pose, intrinsics, layout, depth_min)
        })
        .flat_map_iter(|footprint| split_into_tiles(footprint, layout.tile_size))
        .collect();

    let dropped = tiles.len().saturating_sub(capacity);
    tiles.truncate(capacity);
    (tiles, dropped)
}

/// Coarse per-cell depth bounds for the raymarcher
pub struct ZRangeMap {
    layout: TileLayout,
    ranges: Vec<[f32; 2]>,
}

impl ZRangeMap {
    /// Stage two: fold every tile's interval into the cells it covers.
    ///
    /// Depths are positive, so their IEEE bit patterns order like the values
    /// and `fetch_min`/`fetch_max` on the raw bits gives the float min/max.
    pub fn from_tiles(layout: TileLayout, tiles: &[RenderingBlock]) -> Self {
        let near: Vec<AtomicU32> = (0..layout.cell_count())
            .map(|_| AtomicU32::new(f32::MAX.to_bits()))
            .collect();
        let far: Vec<AtomicU32> = (0..layout.cell_count())
            .map(|_| AtomicU32::new(0))
            .collect();

        tiles.par_iter().for_each(|tile| {
            let z_near = tile.z_range[0].max(0.0).to_bits();
            let z_far = tile.z_range[1].max(0.0).to_bits();
            for y in tile.upper_left[1]..=tile.lower_right[1] {
                for x in tile.upper_left[0]..=tile.lower_right[0] {
                    let cell = (y * layout.grid_width + x) as usize;
                    near[cell].fetch_min(z_near, Ordering::Relaxed);
                    far[cell].fetch_max(z_far, Ordering::Relaxed);
                }
            }
        });

        let ranges = near
            .into_iter()
            .zip(far)
            .map(|(n, f)| [f32::from_bits(n.into_inner()), f32::from_bits(f.into_inner())])
            .collect();
        Self { layout, ranges }
    }

    /// Depth interval to march for pixel (x, y); `None` where nothing projects
    #[inline]
    pub fn range_at(&self, x: u32, y: u32) -> Option<(f32, f32)> {
        let cx = x / self.layout.subsample;
        let cy = y / self.layout.subsample;
        let [near, far] = *self
            .ranges
            .get((cy * self.layout.grid_width + cx) as usize)?;
        (near <= far).then_some((near, far))
    }

    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiles_cover_footprint_without_overlap() {
        let footprint = RenderingBlock {
            upper_left: [2, 3],
            lower_right: [40, 20],
            z_range: [1.0, 1.5],
        };
        let tiles: Vec<_> = split_into_tiles(footprint, 16).collect();
        assert_eq!(tiles.len(), 3 * 2);

        let covered: u32 = tiles
            .iter()
            .map(|t| (t.lower_right[0] - t.upper_left[0] + 1) * (t.lower_right[1] - t.upper_left[1] + 1))
            .sum();
        assert_eq!(covered, 39 * 18);
    }

    #[test]
    fn test_zrange_takes_min_and_max() {
        let intrinsics = CameraIntrinsics::new(80.0, 80.0, 40.0, 30.0, 80, 60);
        let layout = TileLayout::new(&intrinsics, 8, 16);
        assert_eq!((layout.grid_width, layout.grid_height), (10, 8));

        let tiles = [
            RenderingBlock { upper_left: [0, 0], lower_right: [3, 3], z_range: [1.0, 2.0] },
            RenderingBlock { upper_left: [2, 2], lower_right: [5, 5], z_range: [0.5, 1.5] },
        ];
        let zmap = ZRangeMap::from_tiles(layout, &tiles);
        assert_eq!(zmap.range_at(0, 0), Some((1.0, 2.0)));
        assert_eq!(zmap.range_at(17, 17), Some((0.5, 2.0)));
        assert_eq!(zmap.range_at(47, 47), Some((0.5, 1.5)));
        assert_eq!(zmap.range_at(79, 59), None);
    }

    #[test]
    fn test_block_behind_camera_is_dropped() {
        let intrinsics = CameraIntrinsics::new(80.0, 80.0, 40.0, 30.0, 80, 60);
        let layout = TileLayout::new(&intrinsics, 8, 16);
        let behind = project_block(glam::IVec3::new(0, 0, -5), 0.08, &Pose::IDENTITY, &intrinsics, &layout, 0.1);
        assert!(behind.is_none());

        let ahead = project_block(glam::IVec3::new(0, 0, 10), 0.08, &Pose::IDENTITY, &intrinsics, &layout, 0.1)
            .unwrap();
        assert!((ahead.z_range[0] - 0.8).abs() < 1e-5);
        assert!((ahead.z_range[1] - 0.88).abs() < 1e-5);
        assert_eq!(ahead.upper_left, [5, 3]);
    }
}
