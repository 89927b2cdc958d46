// Per-frame pass timings on a synthetic sphere scene

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fusion_engine::synthetic::{orbit_poses, sphere_depth};
use fusion_engine::{CameraIntrinsics, MapConfig, VoxelMap};
use glam::Vec3;

fn bench_config() -> MapConfig {
    MapConfig {
        num_buckets: 0x4000,
        num_excess_entries: 0x1000,
        num_blocks: 0x2000,
        voxel_size: 0.01,
        truncation_distance: 0.04,
        camera: CameraIntrinsics::new(262.5, 262.5, 160.0, 120.0, 320, 240),
        ..Default::default()
    }
}

fn bench_frame_passes(c: &mut Criterion) {
    let config = bench_config();
    let center = Vec3::new(0.0, 0.0, 1.5);
    let pose = orbit_poses(center, 1.0, 0.2, 1)[0];
    let depth = sphere_depth(&config.camera, &pose, center, 0.3);

    let mut map = VoxelMap::new(config).unwrap();
    map.fuse_frame(&pose, &depth, None);

    c.bench_function("update_visibility", |b| {
        b.iter(|| black_box(map.update_visibility(&pose, &depth)))
    });

    c.bench_function("integrate", |b| {
        b.iter(|| black_box(map.fuse(&pose, &depth, None)))
    });

    c.bench_function("raycast", |b| b.iter(|| black_box(map.raycast(&pose))));

    c.bench_function("extract_mesh", |b| {
        b.iter(|| black_box(map.extract_mesh().triangle_count()))
    });
}

criterion_group!(benches, bench_frame_passes);
criterion_main!(benches);
