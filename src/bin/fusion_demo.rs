//! Fuse a synthetic orbit around a sphere, then write a preview rendering,
//! an STL mesh and a map dump.
//!
//! Usage: fusion_demo [config.toml] [output_dir]

use std::path::PathBuf;

use anyhow::{Context, Result};
use fusion_engine::synthetic::{add_depth_noise, orbit_poses, solid_color, sphere_depth};
use fusion_engine::{DumpCompression, MapConfig, VoxelMap};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;

const FRAMES: usize = 48;
const SPHERE_RADIUS: f32 = 0.3;
const ORBIT_RADIUS: f32 = 1.0;
const DEPTH_NOISE: f32 = 0.002;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info,fusion_engine=debug"))
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => MapConfig::load(&path).with_context(|| format!("loading config {}", path))?,
        None => MapConfig::default(),
    };
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "fusion_out".to_string()));
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut map = VoxelMap::new(config.clone()).context("creating voxel map")?;
    let intrinsics = config.camera;
    let center = Vec3::new(0.0, 0.0, 1.5);
    let color = solid_color(&intrinsics, [200, 120, 60]);
    let mut rng = StdRng::seed_from_u64(42);

    let poses = orbit_poses(center, ORBIT_RADIUS, 0.25, FRAMES);
    for (i, pose) in poses.iter().enumerate() {
        let mut depth = sphere_depth(&intrinsics, pose, center, SPHERE_RADIUS);
        add_depth_noise(&mut depth, DEPTH_NOISE, &mut rng);

        let report = map.fuse_frame(pose, &depth, Some(&color));
        log::info!(
            "Frame {:>3}: {} visible, {} new blocks, {} integrated",
            i,
            report.visibility.visible,
            report.visibility.allocated,
            report.integrated
        );
    }

    let stats = map.stats();
    log::info!(
        "Map: {} blocks allocated, {} free, {} excess entries used",
        stats.allocated_blocks,
        stats.free_blocks,
        stats.excess_used
    );

    let render = map.render_map(&poses[0]);
    log::info!("Rendered {} valid pixels", render.valid_pixels);
    let preview = image::RgbaImage::from_raw(
        render.preview.width(),
        render.preview.height(),
        bytemuck::cast_slice::<[u8; 4], u8>(render.preview.as_slice()).to_vec(),
    )
    .context("preview size does not match its buffer")?;
    let preview_path = out_dir.join("preview.png");
    preview
        .save(&preview_path)
        .with_context(|| format!("writing {}", preview_path.display()))?;

    let triangles = map.save_mesh(out_dir.join("sphere.stl"))?;
    log::info!("Extracted {} triangles", triangles);

    map.save(out_dir.join("map.vxhm"), DumpCompression::Zlib)?;

    log::info!("Outputs written to {}", out_dir.display());
    Ok(())
}
