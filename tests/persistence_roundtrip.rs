//! Dump/reload and mesh export through the public map API

use fusion_engine::synthetic::{orbit_poses, solid_color, sphere_depth};
use fusion_engine::{CameraIntrinsics, DumpCompression, MapConfig, MapError, VoxelMap};
use glam::Vec3;
use tempfile::TempDir;

fn config() -> MapConfig {
    MapConfig {
        num_buckets: 1024,
        bucket_size: 2,
        num_excess_entries: 256,
        num_blocks: 1024,
        voxel_size: 0.02,
        truncation_distance: 0.08,
        worker_threads: Some(2),
        camera: CameraIntrinsics::new(60.0, 60.0, 30.0, 20.0, 60, 40),
        ..Default::default()
    }
}

fn fused_map(config: &MapConfig) -> VoxelMap {
    let center = Vec3::new(0.0, 0.0, 1.5);
    let color = solid_color(&config.camera, [90, 90, 240]);
    let mut map = VoxelMap::new(config.clone()).unwrap();
    for pose in orbit_poses(center, 1.0, 0.2, 6) {
        let depth = sphere_depth(&config.camera, &pose, center, 0.3);
        map.fuse_frame(&pose, &depth, Some(&color));
    }
    map
}

fn assert_same_contents(a: &VoxelMap, b: &VoxelMap) {
    let (va, vb) = (a.map_view(), b.map_view());
    let mut blocks_a = va.allocated_blocks();
    let mut blocks_b = vb.allocated_blocks();
    blocks_a.sort_by_key(|(c, _)| (c.x, c.y, c.z));
    blocks_b.sort_by_key(|(c, _)| (c.x, c.y, c.z));
    assert_eq!(blocks_a, blocks_b);

    for (_, ptr) in &blocks_a {
        assert_eq!(va.voxels.block(*ptr), vb.voxels.block(*ptr));
    }
    assert_eq!(a.stats().free_blocks, b.stats().free_blocks);
    assert_eq!(a.stats().excess_used, b.stats().excess_used);
}

#[test]
fn test_dump_reload_restores_map() {
    let dir = TempDir::new().unwrap();
    let config = config();
    let original = fused_map(&config);
    assert!(original.stats().allocated_blocks > 0);

    for (name, compression) in [("raw.vxhm", DumpCompression::None), ("zlib.vxhm", DumpCompression::Zlib)] {
        let path = dir.path().join(name);
        original.save(&path, compression).unwrap();

        let mut restored = VoxelMap::new(config.clone()).unwrap();
        restored.load(&path).unwrap();
        assert_same_contents(&original, &restored);
        assert_eq!(
            original.extract_mesh().triangle_count(),
            restored.extract_mesh().triangle_count()
        );
    }
}

#[test]
fn test_reloaded_map_keeps_fusing() {
    let config = config();
    let original = fused_map(&config);
    let mut bytes = Vec::new();
    original.save_to(&mut bytes, DumpCompression::None).unwrap();

    let mut restored = VoxelMap::new(config.clone()).unwrap();
    restored.load_from(bytes.as_slice()).unwrap();
    assert_eq!(restored.stats().visible_entries, 0);

    // Re-observing the same scene allocates nothing new
    let center = Vec3::new(0.0, 0.0, 1.5);
    let pose = orbit_poses(center, 1.0, 0.2, 6)[0];
    let depth = sphere_depth(&config.camera, &pose, center, 0.3);
    let report = restored.fuse_frame(&pose, &depth, None);
    assert_eq!(report.visibility.allocated, 0);
    assert!(report.integrated > 0);
}

#[test]
fn test_capacity_mismatch_leaves_map_untouched() {
    let config = config();
    let original = fused_map(&config);
    let mut bytes = Vec::new();
    original.save_to(&mut bytes, DumpCompression::Zlib).unwrap();

    let smaller = MapConfig {
        num_blocks: 512,
        ..config.clone()
    };
    let mut target = fused_map(&smaller);
    let before = target.stats();

    let err = target.load_from(bytes.as_slice()).unwrap_err();
    assert!(matches!(
        err,
        MapError::CapacityMismatch {
            field: "num_blocks",
            expected: 512,
            found: 1024
        }
    ));
    assert_eq!(target.stats(), before);
}

#[test]
fn test_truncated_dump_is_rejected() {
    let config = config();
    let mut bytes = Vec::new();
    fused_map(&config).save_to(&mut bytes, DumpCompression::None).unwrap();
    bytes.truncate(bytes.len() / 2);

    let mut target = VoxelMap::new(config).unwrap();
    assert!(target.load_from(bytes.as_slice()).is_err());
}

#[test]
fn test_missing_dump_file() {
    let dir = TempDir::new().unwrap();
    let mut map = VoxelMap::new(config()).unwrap();
    let err = map.load(dir.path().join("absent.vxhm")).unwrap_err();
    assert!(matches!(err, MapError::Io(_)));
}

#[test]
fn test_stl_export_matches_mesh() {
    let dir = TempDir::new().unwrap();
    let map = fused_map(&config());
    let path = dir.path().join("mesh.stl");

    let triangles = map.save_mesh(&path).unwrap();
    assert!(triangles > 0);

    let bytes = std::fs::read(&path).unwrap();
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    assert_eq!(count, triangles);
    assert_eq!(bytes.len(), 84 + 50 * triangles);
}
