//! End-to-end tests of the per-frame passes on synthetic scenes

use std::collections::HashSet;

use fusion_engine::fusion::blocks_along_ray;
use fusion_engine::map::{local_offset, voxel_to_world};
use fusion_engine::synthetic::{orbit_poses, plane_depth, solid_color, sphere_depth};
use fusion_engine::{
    CameraIntrinsics, DepthFrame, KeyInsert, KeyPoint, MapConfig, Pose, VoxelMap, BLOCK_SIZE,
};
use glam::{IVec3, Mat3, Vec3};

fn small_camera() -> CameraIntrinsics {
    CameraIntrinsics::new(40.0, 40.0, 20.0, 15.0, 40, 30)
}

fn plane_config() -> MapConfig {
    MapConfig {
        num_buckets: 2048,
        bucket_size: 2,
        num_excess_entries: 512,
        num_blocks: 1024,
        voxel_size: 0.01,
        truncation_distance: 0.04,
        max_weight: 5,
        worker_threads: Some(4),
        camera: small_camera(),
        ..Default::default()
    }
}

fn sphere_config() -> MapConfig {
    MapConfig {
        num_buckets: 4096,
        bucket_size: 2,
        num_excess_entries: 1024,
        num_blocks: 2048,
        voxel_size: 0.02,
        truncation_distance: 0.08,
        worker_threads: Some(4),
        camera: CameraIntrinsics::new(80.0, 80.0, 40.0, 30.0, 80, 60),
        ..Default::default()
    }
}

#[test]
fn test_plane_converges_to_signed_distance() {
    let config = plane_config();
    let mu = config.truncation_distance;
    let mut map = VoxelMap::new(config.clone()).unwrap();
    let depth = plane_depth(&config.camera, 1.0);

    for _ in 0..8 {
        map.fuse_frame(&Pose::IDENTITY, &depth, None);
    }

    let view = map.map_view();
    let mut observed = 0;
    for (coord, ptr) in view.allocated_blocks() {
        let block = view.voxels.block(ptr).unwrap();
        for (i, voxel) in block.iter().enumerate() {
            let world = voxel_to_world(coord * BLOCK_SIZE + local_offset(i), config.voxel_size);
            let expected = 1.0 - world.z;
            if !voxel.is_observed() {
                continue;
            }
            observed += 1;
            assert_eq!(voxel.weight, config.max_weight);
            assert!(
                (voxel.sdf * mu - expected).abs() < 1e-4,
                "voxel at {:?}: sdf {} expected {}",
                world,
                voxel.sdf * mu,
                expected
            );
        }
    }
    assert!(observed > 0);
    assert_eq!(map.stats().fused_frames, 8);
}

#[test]
fn test_voxels_outside_band_stay_empty() {
    let config = plane_config();
    let mu = config.truncation_distance;
    let mut map = VoxelMap::new(config.clone()).unwrap();
    map.fuse_frame(&Pose::IDENTITY, &plane_depth(&config.camera, 1.0), None);

    let view = map.map_view();
    for (coord, ptr) in view.allocated_blocks() {
        let block = view.voxels.block(ptr).unwrap();
        for (i, voxel) in block.iter().enumerate() {
            let world = voxel_to_world(coord * BLOCK_SIZE + local_offset(i), config.voxel_size);
            if (1.0 - world.z).abs() > mu + 1e-3 {
                assert!(!voxel.is_observed(), "voxel at {:?} outside the band was updated", world);
            }
        }
    }
}

#[test]
fn test_allocation_matches_ray_walk() {
    let config = sphere_config();
    let center = Vec3::new(0.0, 0.0, 1.5);
    let pose = orbit_poses(center, 1.0, 0.2, 4)[1];
    let depth = sphere_depth(&config.camera, &pose, center, 0.3);

    let mut expected: HashSet<IVec3> = HashSet::new();
    for v in 0..config.camera.height {
        for u in 0..config.camera.width {
            let d = depth.valid_depth(u, v, config.depth_min, config.depth_max);
            expected.extend(blocks_along_ray(&config.camera, &pose, u, v, d, &config));
        }
    }
    assert!(!expected.is_empty());

    let mut map = VoxelMap::new(config).unwrap();
    let first = map.update_visibility(&pose, &depth);
    assert_eq!(first.allocated, expected.len());
    assert_eq!(first.visible, expected.len());
    assert_eq!(first.heap_exhausted, 0);

    let second = map.update_visibility(&pose, &depth);
    assert_eq!(second.allocated, 0);
    assert_eq!(second.visible, expected.len());

    let stats = map.stats();
    assert_eq!(stats.allocated_blocks, expected.len());
    assert_eq!(stats.free_blocks as usize, stats.heap_capacity as usize - expected.len());

    let view = map.map_view();
    for coord in &expected {
        assert!(view.is_allocated(*coord));
    }
}

#[test]
fn test_sphere_mesh_lies_on_surface() {
    let config = sphere_config();
    let tolerance = config.truncation_distance + config.voxel_size;
    let center = Vec3::new(0.0, 0.0, 1.5);
    let radius = 0.3;
    let color = solid_color(&config.camera, [10, 200, 30]);
    let mut map = VoxelMap::new(config.clone()).unwrap();

    for pose in orbit_poses(center, 1.0, 0.2, 12) {
        let depth = sphere_depth(&config.camera, &pose, center, radius);
        map.fuse_frame(&pose, &depth, Some(&color));
    }

    let mesh = map.extract_mesh();
    assert!(mesh.triangle_count() > 100, "only {} triangles", mesh.triangle_count());
    assert_eq!(mesh.dropped(), 0);
    for v in mesh.vertices() {
        let err = ((v.position - center).length() - radius).abs();
        assert!(err < tolerance, "vertex {:?} is {} from the sphere", v.position, err);
    }

    map.reset();
    assert_eq!(map.extract_mesh().triangle_count(), 0);
}

#[test]
fn test_raycast_plane() {
    let config = plane_config();
    let mut map = VoxelMap::new(config.clone()).unwrap();
    let depth = plane_depth(&config.camera, 1.0);
    for _ in 0..3 {
        map.fuse_frame(&Pose::IDENTITY, &depth, Some(&solid_color(&config.camera, [255, 0, 0])));
    }

    let render = map.raycast(&Pose::IDENTITY);
    assert!(render.rendering_blocks > 0);
    assert!(render.valid_pixels * 2 > config.camera.pixel_count());

    let vertex = *render.vertex_map.get(20, 15).unwrap();
    let normal = *render.normal_map.get(20, 15).unwrap();
    assert!((vertex.z - 1.0).abs() < config.voxel_size);
    assert!(normal.z < -0.9);
    assert_eq!(render.preview.get(20, 15).unwrap()[3], 255);
}

#[test]
fn test_raycast_without_visible_blocks_is_empty() {
    let config = plane_config();
    let map = VoxelMap::new(config.clone()).unwrap();
    let render = map.raycast(&Pose::IDENTITY);
    assert!(render.is_empty());
    assert_eq!(render.vertex_map.width(), config.camera.width);
    assert!(render.vertex_map.as_slice().iter().all(|p| p.x.is_nan()));
}

#[test]
fn test_reset_is_idempotent() {
    let config = plane_config();
    let mut map = VoxelMap::new(config.clone()).unwrap();
    let depth = plane_depth(&config.camera, 1.0);

    let first = map.fuse_frame(&Pose::IDENTITY, &depth, None);
    assert!(first.visibility.allocated > 0);

    map.reset();
    let once = map.stats();
    map.reset();
    let twice = map.stats();

    assert_eq!(once, twice);
    assert_eq!(once.allocated_blocks, 0);
    assert_eq!(once.free_blocks, once.heap_capacity);
    assert_eq!(once.excess_used, 0);
    assert_eq!(once.visible_entries, 0);

    let again = map.fuse_frame(&Pose::IDENTITY, &depth, None);
    assert_eq!(again.visibility.allocated, first.visibility.allocated);
}

#[test]
fn test_degenerate_inputs_are_skipped() {
    let config = plane_config();
    let mut map = VoxelMap::new(config.clone()).unwrap();

    let bad_pose = Pose::new(Mat3::ZERO, Vec3::ZERO);
    let report = map.fuse_frame(&bad_pose, &plane_depth(&config.camera, 1.0), None);
    assert_eq!(report.visibility.allocated, 0);
    assert_eq!(report.integrated, 0);

    let wrong_size = DepthFrame::filled(10, 10, 1.0);
    let report = map.fuse_frame(&Pose::IDENTITY, &wrong_size, None);
    assert_eq!(report.visibility.allocated, 0);
    assert_eq!(map.stats().allocated_blocks, 0);
    assert_eq!(map.stats().fused_frames, 0);

    map.fuse_frame(&Pose::IDENTITY, &plane_depth(&config.camera, 1.0), None);
    assert_eq!(map.stats().fused_frames, 1);
}

#[test]
fn test_keypoints_through_map() {
    let config = plane_config();
    let mut map = VoxelMap::new(config).unwrap();

    let position = Vec3::new(0.1, -0.2, 1.0);
    let key = KeyPoint::new([7; 32], position, -Vec3::Z);
    assert_eq!(map.keypoints().insert(key), KeyInsert::Inserted);
    assert_eq!(map.key_view().lookup(position), Some(key));
    assert_eq!(map.key_view().collect_keys().len(), 1);
    assert_eq!(map.stats().keypoints, 1);

    map.reset();
    assert!(map.key_view().is_empty());
    assert_eq!(map.key_view().lookup(position), None);
}
