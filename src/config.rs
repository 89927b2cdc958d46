//! Map configuration
//!
//! All structures are sized once from this at construction; nothing grows
//! afterwards. Loaded from TOML by the demo binary, built in code by tests.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::camera::CameraIntrinsics;
use crate::error::{MapError, MapResult};
use crate::map::hash_table::entry_count;
use crate::map::BLOCK_SIZE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Number of hash buckets
    pub num_buckets: u32,
    /// Primary entries per bucket
    pub bucket_size: u32,
    /// Entries in the shared overflow list
    pub num_excess_entries: u32,
    /// Voxel block heap capacity
    pub num_blocks: u32,
    /// Voxel edge length in meters
    pub voxel_size: f32,
    /// TSDF truncation margin in meters
    pub truncation_distance: f32,
    /// Saturation cap for the per-voxel weight
    pub max_weight: u32,
    pub depth_min: f32,
    pub depth_max: f32,
    /// Pixel stride of the allocation ray walk (1 = every pixel)
    pub allocation_stride: u32,
    /// Walk the whole [depth_min, depth_max] range for pixels without depth
    pub allocate_missing_depth: bool,
    pub max_rendering_blocks: u32,
    /// Pixels per z-range cell along each axis
    pub zrange_subsample: u32,
    /// Z-range cells per rendering tile along each axis
    pub rendering_tile_size: u32,
    /// Raymarch step inside allocated blocks, in voxels
    pub raycast_step: f32,
    pub max_triangles: u32,
    pub key_buckets: u32,
    pub key_bucket_size: u32,
    /// Spatial cell edge used to hash keypoints, in meters
    pub key_cell_size: f32,
    /// Worker threads for the passes; `None` uses all cores
    pub worker_threads: Option<usize>,
    pub camera: CameraIntrinsics,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            num_buckets: 0x20000,
            bucket_size: 2,
            num_excess_entries: 0x8000,
            num_blocks: 0x4000,
            voxel_size: 0.01,
            truncation_distance: 0.04,
            max_weight: 100,
            depth_min: 0.1,
            depth_max: 3.0,
            allocation_stride: 1,
            allocate_missing_depth: false,
            max_rendering_blocks: 65_535,
            zrange_subsample: 8,
            rendering_tile_size: 16,
            raycast_step: 0.5,
            max_triangles: 2_000_000,
            key_buckets: 0x10000,
            key_bucket_size: 4,
            key_cell_size: 0.02,
            worker_threads: None,
            camera: CameraIntrinsics::default(),
        }
    }
}

impl MapConfig {
    pub fn from_toml_str(raw: &str) -> MapResult<Self> {
        let config: MapConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> MapResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Total hash entries: primary slots plus the excess list
    pub fn num_entries(&self) -> u64 {
        entry_count(self.num_buckets, self.bucket_size, self.num_excess_entries)
    }

    /// Edge length of one voxel block in meters
    pub fn block_world_size(&self) -> f32 {
        self.voxel_size * BLOCK_SIZE as f32
    }

    pub fn validate(&self) -> MapResult<()> {
        let invalid = |msg: &str| Err(MapError::InvalidConfig(msg.to_string()));

        if self.num_buckets == 0 || self.bucket_size == 0 {
            return invalid("hash table needs at least one bucket and one slot per bucket");
        }
        if self.num_blocks == 0 {
            return invalid("num_blocks must be non-zero");
        }
        if self.num_entries() > i32::MAX as u64 || (self.num_blocks as u64) > i32::MAX as u64 {
            return invalid("entry and block indices must fit in i32");
        }
        if !(self.voxel_size > 0.0) {
            return invalid("voxel_size must be positive");
        }
        if self.truncation_distance < self.voxel_size {
            return invalid("truncation_distance must be at least one voxel");
        }
        if self.max_weight == 0 {
            return invalid("max_weight must be non-zero");
        }
        if !(self.depth_min > 0.0) || self.depth_min >= self.depth_max {
            return invalid("depth range must satisfy 0 < depth_min < depth_max");
        }
        if self.allocation_stride == 0 || self.zrange_subsample == 0 || self.rendering_tile_size == 0 {
            return invalid("strides and tile sizes must be non-zero");
        }
        if !(self.raycast_step > 0.0) {
            return invalid("raycast_step must be positive");
        }
        if self.key_buckets == 0 || self.key_bucket_size == 0 || !(self.key_cell_size > 0.0) {
            return invalid("keypoint table needs buckets, slots and a positive cell size");
        }
        if self.worker_threads == Some(0) {
            return invalid("worker_threads must be non-zero when set");
        }
        if !self.camera.is_valid() {
            return invalid("camera intrinsics are degenerate");
        }
        Ok(())
    }
}
