use std::ops::Add;

use glam::{IVec3, Vec3};
use rayon::prelude::*;

use crate::camera::{CameraIntrinsics, Pose};
use crate::config::MapConfig;
use crate::frame::DepthFrame;
use crate::map::{
    BlockHeap, CapacityClass, CapacityWarnings, HashTable, InsertOutcome, VisibleEntrySet,
};

/// Outcome of one visibility and allocation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityReport {
    /// Entries in the compacted visible set
    pub visible: usize,
    /// Blocks created by this pass
    pub allocated: usize,
    /// Insert attempts refused because the heap was empty
    pub heap_exhausted: usize,
    /// Insert attempts refused because the excess list was full
    pub excess_exhausted: usize,
    /// Pixels whose ray walk was issued
    pub rays: usize,
}

impl Add for VisibilityReport {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            visible: self.visible + rhs.visible,
            allocated: self.allocated + rhs.allocated,
            heap_exhausted: self.heap_exhausted + rhs.heap_exhausted,
            excess_exhausted: self.excess_exhausted + rhs.excess_exhausted,
            rays: self.rays + rhs.rays,
        }
    }
}

/// Block coordinates crossed by the allocation ray of pixel (u, v).
///
/// With a measured depth the walk covers the truncation band around the
/// surface point; without one it covers [depth_min, depth_max] only when
/// `allocate_missing_depth` is set. Samples are spaced at most half a block
/// apart so no block along the segment is skipped; consecutive repeats are
/// collapsed but a block may still appear twice if the ray re-enters it.
pub fn blocks_along_ray(
    intrinsics: &CameraIntrinsics,
    pose: &Pose,
    u: u32,
    v: u32,
    depth: Option<f32>,
    config: &MapConfig,
) -> Vec<IVec3> {
    let dir = intrinsics.ray_direction(u as f32, v as f32);
    let mu = config.truncation_distance;

    let (near, far) = match depth {
        Some(d) => {
            let point = dir * d;
            let len = point.length();
            (point * (1.0 - mu / len), point * (1.0 + mu / len))
        }
        None if config.allocate_missing_depth => (dir * config.depth_min, dir * config.depth_max),
        None => return Vec::new(),
    };

    let block_size = config.block_world_size();
    let start = pose.camera_to_world(near) / block_size;
    let end = pose.camera_to_world(far) / block_size;
    let span = end - start;
    let steps = (span.length() * 2.0).ceil().max(1.0) as usize;

    let mut blocks: Vec<IVec3> = Vec::with_capacity(steps + 1);
    for i in 0..=steps {
        let p = start + span * (i as f32 / steps as f32);
        let block = p.floor().as_ivec3();
        if blocks.last() != Some(&block) {
            blocks.push(block);
        }
    }
    blocks
}

fn pixel_depth(depth: &DepthFrame, u: u32, v: u32, config: &MapConfig) -> Option<f32> {
    depth.valid_depth(u, v, config.depth_min, config.depth_max)
}

/// Run the allocation ray walk over the frame and rebuild the visible set.
///
/// Blocks are inserted on the fly; already-allocated blocks whose centre
/// projects inside the image within the depth range are marked as well.
/// Heap slots lost in insert races are reclaimed before returning.
pub fn update_visibility(
    table: &HashTable,
    heap: &mut BlockHeap,
    visible: &mut VisibleEntrySet,
    pose: &Pose,
    depth: &DepthFrame,
    config: &MapConfig,
    warnings: &CapacityWarnings,
) -> VisibilityReport {
    visible.begin_frame();

    let intrinsics = &config.camera;
    if pose.is_degenerate() {
        log::warn!("Skipping allocation: degenerate pose");
        return VisibilityReport::default();
    }
    if depth.is_empty() || depth.width() != intrinsics.width || depth.height() != intrinsics.height {
        log::warn!(
            "Skipping allocation: depth frame is {}x{}, camera expects {}x{}",
            depth.width(),
            depth.height(),
            intrinsics.width,
            intrinsics.height
        );
        return VisibilityReport::default();
    }

    let stride = config.allocation_stride as usize;
    let rows: Vec<u32> = (0..intrinsics.height).step_by(stride).collect();

    let mut report = {
        let heap: &BlockHeap = heap;
        let visible: &VisibleEntrySet = visible;

        rows.par_iter()
            .map(|&v| {
                let mut row = VisibilityReport::default();
                for u in (0..intrinsics.width).step_by(stride) {
                    let d = pixel_depth(depth, u, v, config);
                    let blocks = blocks_along_ray(intrinsics, pose, u, v, d, config);
                    if blocks.is_empty() {
                        continue;
                    }
                    row.rays += 1;
                    for block in blocks {
                        match table.try_insert(block, heap) {
                            InsertOutcome::Inserted { entry, .. } => {
                                row.allocated += 1;
                                visible.mark(entry);
                            }
                            InsertOutcome::Existing { entry, .. } => {
                                visible.mark(entry);
                            }
                            InsertOutcome::HeapExhausted => row.heap_exhausted += 1,
                            InsertOutcome::ExcessExhausted => row.excess_exhausted += 1,
                        }
                    }
                }
                row
            })
            .reduce(VisibilityReport::default, |a, b| a + b)
    };

    mark_in_frustum(table, visible, pose, config);

    let reclaimed = heap.reclaim();
    if reclaimed > 0 {
        log::debug!("Reclaimed {} heap slot(s) from insert races", reclaimed);
    }

    warnings.report(CapacityClass::Heap, report.heap_exhausted);
    warnings.report(CapacityClass::ExcessList, report.excess_exhausted);

    let dropped = visible.compact();
    if dropped > 0 {
        log::warn!("Visible entry list full, {} entries dropped", dropped);
    }
    report.visible = visible.len();

    log::debug!(
        "Visibility: {} visible, {} allocated, {} rays",
        report.visible,
        report.allocated,
        report.rays
    );
    report
}

/// Mark allocated blocks whose centre lands inside the image and depth range
fn mark_in_frustum(table: &HashTable, visible: &VisibleEntrySet, pose: &Pose, config: &MapConfig) {
    let block_size = config.block_world_size();
    let half = Vec3::splat(0.5 * block_size);

    table
        .allocated_entries()
        .par_iter()
        .filter(|(index, _)| !visible.is_marked(*index))
        .for_each(|(index, entry)| {
            let center = entry.block_coord().as_vec3() * block_size + half;
            let cam = pose.world_to_camera(center);
            if cam.z < config.depth_min || cam.z > config.depth_max {
                return;
            }
            if config.camera.project_to_pixel(cam).is_some() {
                visible.mark(*index);
            }
        });
}
