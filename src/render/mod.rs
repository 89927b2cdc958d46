/// Render Pipeline
///
/// Two stages:
/// 1. Project every visible block into screen space and cut its footprint
///    into fixed-size tiles (`RenderingBlock`) carrying the block's depth
///    interval, then fold the tiles into a coarse z-range buffer.
/// 2. Raymarch each pixel between its z-range bounds to the zero crossing of
///    the TSDF, producing vertex, normal and preview images.

pub mod raycast;
pub mod rendering_block;

pub use raycast::{cast_ray, RayHit, RenderOutput};
pub use rendering_block::{RenderingBlock, TileLayout, ZRangeMap};

use crate::camera::Pose;
use crate::config::MapConfig;
use crate::map::{CapacityClass, CapacityWarnings, MapView, VisibleEntrySet};

/// Render the map from `pose` using the current visible entry set.
///
/// Returns an all-invalid output when no visible block lands on screen.
pub fn raycast(
    view: &MapView<'_>,
    visible: &VisibleEntrySet,
    pose: &Pose,
    config: &MapConfig,
    warnings: &CapacityWarnings,
) -> RenderOutput {
    let intrinsics = &config.camera;
    if pose.is_degenerate() {
        log::warn!("Skipping raycast: degenerate pose");
        return RenderOutput::empty(intrinsics.width, intrinsics.height);
    }

    let layout = TileLayout::new(intrinsics, config.zrange_subsample, config.rendering_tile_size);
    let (tiles, dropped) = rendering_block::build_rendering_blocks(
        view.table,
        visible,
        pose,
        intrinsics,
        &layout,
        config.block_world_size(),
        config.depth_min,
        config.max_rendering_blocks as usize,
    );
    warnings.report(CapacityClass::RenderingBlocks, dropped);

    if tiles.is_empty() {
        log::debug!("Raycast: no rendering blocks, nothing rendered");
        return RenderOutput::empty(intrinsics.width, intrinsics.height);
    }

    let zrange = ZRangeMap::from_tiles(layout, &tiles);
    let step = config.raycast_step * config.voxel_size;
    let (vertex_map, normal_map, preview, valid_pixels) =
        raycast::raycast_pixels(view, &zrange, pose, intrinsics, step);

    log::debug!(
        "Raycast: {} tiles, {} of {} pixels hit the surface",
        tiles.len(),
        valid_pixels,
        intrinsics.pixel_count()
    );

    RenderOutput {
        vertex_map,
        normal_map,
        preview,
        rendering_blocks: tiles.len(),
        valid_pixels,
    }
}
