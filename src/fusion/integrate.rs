use glam::IVec3;
use rayon::prelude::*;

use crate::camera::Pose;
use crate::config::MapConfig;
use crate::frame::{ColorFrame, DepthFrame};
use crate::map::{local_offset, voxel_to_world, HashTable, VisibleEntrySet, Voxel, VoxelStore, BLOCK_SIZE};

/// Fuse one depth (and optional color) frame into every visible block.
///
/// Each voxel corner is projected into the frame; voxels whose signed
/// distance to the measured surface lies within the truncation margin take a
/// unit-weight running-average update. Returns the number of blocks in
/// which at least one voxel changed, or `None` when the frame is rejected
/// before any block is visited.
///
/// Blocks are handed to workers as disjoint slices of the voxel store, so no
/// voxel is ever written by two workers.
pub fn integrate_frame(
    table: &HashTable,
    voxels: &mut VoxelStore,
    visible: &VisibleEntrySet,
    pose: &Pose,
    depth: &DepthFrame,
    color: Option<&ColorFrame>,
    config: &MapConfig,
) -> Option<usize> {
    let intrinsics = &config.camera;
    if pose.is_degenerate() {
        log::warn!("Skipping fusion: degenerate pose");
        return None;
    }
    if depth.width() != intrinsics.width || depth.height() != intrinsics.height || depth.is_empty() {
        log::warn!("Skipping fusion: depth frame does not match camera resolution");
        return None;
    }

    let color = color.filter(|c| {
        let matches = c.width() == depth.width() && c.height() == depth.height();
        if !matches {
            log::warn!("Color frame size differs from depth frame, fusing depth only");
        }
        matches
    });

    // Heap slot -> block coordinate for this frame's targets
    let mut targets: Vec<Option<IVec3>> = vec![None; voxels.num_blocks()];
    for &entry in visible.entries() {
        let slot = table.entry_ptr(entry);
        if let Some(target) = usize::try_from(slot).ok().and_then(|s| targets.get_mut(s)) {
            *target = Some(table.entry_pos(entry));
        }
    }

    let integrated = voxels
        .par_blocks_mut()
        .filter_map(|(slot, block)| targets[slot].map(|coord| (coord, block)))
        .map(|(coord, block)| integrate_block(coord, block, pose, depth, color, config))
        .filter(|&touched| touched)
        .count();

    log::debug!(
        "Fusion: {} of {} visible blocks updated",
        integrated,
        visible.len()
    );
    Some(integrated)
}

fn integrate_block(
    coord: IVec3,
    block: &mut [Voxel],
    pose: &Pose,
    depth: &DepthFrame,
    color: Option<&ColorFrame>,
    config: &MapConfig,
) -> bool {
    let intrinsics = &config.camera;
    let mu = config.truncation_distance;
    let origin = coord * BLOCK_SIZE;
    let mut touched = false;

    for (i, voxel) in block.iter_mut().enumerate() {
        let world = voxel_to_world(origin + local_offset(i), config.voxel_size);
        let cam = pose.world_to_camera(world);

        let Some((u, v)) = intrinsics.project_to_pixel(cam) else {
            continue;
        };
        let Some(measured) = depth.valid_depth(u, v, config.depth_min, config.depth_max) else {
            continue;
        };

        let sdf = measured - cam.z;
        if sdf.abs() > mu {
            continue;
        }

        let rgb = color.and_then(|c| c.get(u, v).copied());
        voxel.integrate(sdf / mu, rgb, config.max_weight);
        touched = true;
    }
    touched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraIntrinsics;
    use crate::map::{BlockHeap, InsertOutcome};

    fn small_config() -> MapConfig {
        MapConfig {
            num_buckets: 256,
            num_excess_entries: 64,
            num_blocks: 64,
            max_weight: 5,
            camera: CameraIntrinsics::new(40.0, 40.0, 20.0, 15.0, 40, 30),
            ..MapConfig::default()
        }
    }

    #[test]
    fn test_only_band_voxels_update() {
        let config = small_config();
        let table = HashTable::new(config.num_buckets, config.bucket_size, config.num_excess_entries);
        let heap = BlockHeap::new(config.num_blocks);
        let mut voxels = VoxelStore::new(config.num_blocks);
        let mut visible = VisibleEntrySet::new(table.num_entries(), config.num_blocks as usize);

        // Block spanning z in [1.04, 1.12), straight ahead of the camera
        let coord = IVec3::new(0, 0, 13);
        let InsertOutcome::Inserted { entry, slot } = table.try_insert(coord, &heap) else {
            panic!("insert failed");
        };
        visible.mark(entry);
        visible.compact();

        let depth = DepthFrame::filled(40, 30, 1.08);
        let updated = integrate_frame(&table, &mut voxels, &visible, &Pose::IDENTITY, &depth, None, &config);
        assert_eq!(updated, Some(1));

        let block = voxels.block(slot).unwrap();
        for (i, voxel) in block.iter().enumerate() {
            let z = (13 * BLOCK_SIZE + local_offset(i).z) as f32 * config.voxel_size;
            if (1.08 - z).abs() <= config.truncation_distance - 1e-4 {
                assert_eq!(voxel.weight, 1);
                let expected = (1.08 - z) / config.truncation_distance;
                assert!((voxel.sdf - expected).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_nothing_visible_nothing_integrated() {
        let config = small_config();
        let table = HashTable::new(config.num_buckets, config.bucket_size, config.num_excess_entries);
        let mut voxels = VoxelStore::new(config.num_blocks);
        let visible = VisibleEntrySet::new(table.num_entries(), config.num_blocks as usize);
        let depth = DepthFrame::filled(40, 30, 1.0);
        assert_eq!(
            integrate_frame(&table, &mut voxels, &visible, &Pose::IDENTITY, &depth, None, &config),
            Some(0)
        );
    }

    #[test]
    fn test_rejected_frame_reports_none() {
        let config = small_config();
        let table = HashTable::new(config.num_buckets, config.bucket_size, config.num_excess_entries);
        let mut voxels = VoxelStore::new(config.num_blocks);
        let visible = VisibleEntrySet::new(table.num_entries(), config.num_blocks as usize);

        let wrong_size = DepthFrame::filled(10, 10, 1.0);
        assert_eq!(
            integrate_frame(&table, &mut voxels, &visible, &Pose::IDENTITY, &wrong_size, None, &config),
            None
        );

        let depth = DepthFrame::filled(40, 30, 1.0);
        let flat = Pose::new(glam::Mat3::ZERO, glam::Vec3::ZERO);
        assert_eq!(
            integrate_frame(&table, &mut voxels, &visible, &flat, &depth, None, &config),
            None
        );
    }
}
