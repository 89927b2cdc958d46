//! Voxel map facade
//!
//! `VoxelMap` owns every fixed-capacity structure plus a dedicated worker
//! pool, and exposes the per-frame API used by a tracking front end:
//! allocate, fuse, render, extract, reset, and dump/reload. Each call runs
//! its pass to completion before returning, which is the only ordering
//! between passes.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::camera::Pose;
use crate::config::MapConfig;
use crate::error::MapResult;
use crate::frame::{ColorFrame, DepthFrame};
use crate::fusion::{self, VisibilityReport};
use crate::keypoints::{KeyMapView, KeyPointMap};
use crate::map::{BlockHeap, CapacityWarnings, HashTable, MapView, VisibleEntrySet, VoxelStore};
use crate::mesh::{self, TriangleBuffer};
use crate::persistence::{self, DumpCompression, DumpLayout, DumpSource, PersistenceErrorContext};
use crate::render::{self, RenderOutput};

/// Result of `VoxelMap::fuse_frame`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub visibility: VisibilityReport,
    /// Blocks with at least one updated voxel
    pub integrated: usize,
}

/// Occupancy snapshot for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapStats {
    pub allocated_blocks: usize,
    pub heap_capacity: u32,
    pub free_blocks: u32,
    pub excess_used: u32,
    pub excess_capacity: u32,
    pub visible_entries: usize,
    pub keypoints: usize,
    pub fused_frames: u64,
}

pub struct VoxelMap {
    config: MapConfig,
    table: HashTable,
    heap: BlockHeap,
    voxels: VoxelStore,
    visible: VisibleEntrySet,
    keys: KeyPointMap,
    warnings: CapacityWarnings,
    pool: ThreadPool,
    fused_frames: u64,
}

impl VoxelMap {
    pub fn new(config: MapConfig) -> MapResult<Self> {
        config.validate()?;

        let threads = config.worker_threads.unwrap_or_else(num_cpus::get).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("fusion-worker-{}", idx))
            .build()?;

        let table = HashTable::new(config.num_buckets, config.bucket_size, config.num_excess_entries);
        let visible = VisibleEntrySet::new(table.num_entries(), config.num_blocks as usize);

        log::info!(
            "Voxel map: {} buckets x {} + {} excess entries, {} blocks of {:.3} m voxels, {} workers",
            config.num_buckets,
            config.bucket_size,
            config.num_excess_entries,
            config.num_blocks,
            config.voxel_size,
            threads
        );

        Ok(Self {
            heap: BlockHeap::new(config.num_blocks),
            voxels: VoxelStore::new(config.num_blocks),
            keys: KeyPointMap::new(config.key_buckets, config.key_bucket_size, config.key_cell_size),
            warnings: CapacityWarnings::new(),
            fused_frames: 0,
            table,
            visible,
            pool,
            config,
        })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Allocate the blocks the frame observes and rebuild the visible set,
    /// using the configured depth range.
    pub fn update_visibility(&mut self, pose: &Pose, depth: &DepthFrame) -> VisibilityReport {
        let (min, max) = (self.config.depth_min, self.config.depth_max);
        self.update_visibility_in_range(pose, depth, min, max)
    }

    /// As `update_visibility` with an explicit near/far validity range.
    pub fn update_visibility_in_range(
        &mut self,
        pose: &Pose,
        depth: &DepthFrame,
        depth_min: f32,
        depth_max: f32,
    ) -> VisibilityReport {
        let mut config = self.config.clone();
        if depth_min > 0.0 && depth_min < depth_max {
            config.depth_min = depth_min;
            config.depth_max = depth_max;
        } else {
            log::warn!(
                "Ignoring invalid depth range [{}, {}], using configured range",
                depth_min,
                depth_max
            );
        }

        let Self {
            table,
            heap,
            visible,
            warnings,
            pool,
            ..
        } = self;
        pool.install(|| fusion::update_visibility(table, heap, visible, pose, depth, &config, warnings))
    }

    /// Integrate a frame into the blocks marked by the last visibility pass.
    ///
    /// Rejected frames (degenerate pose, mismatched depth) integrate nothing
    /// and are not counted in `MapStats::fused_frames`.
    pub fn fuse(&mut self, pose: &Pose, depth: &DepthFrame, color: Option<&ColorFrame>) -> usize {
        let Self {
            config,
            table,
            voxels,
            visible,
            pool,
            ..
        } = self;
        let integrated =
            pool.install(|| fusion::integrate_frame(table, voxels, visible, pose, depth, color, config));
        if integrated.is_some() {
            self.fused_frames += 1;
        }
        integrated.unwrap_or(0)
    }

    /// Visibility and allocation followed by fusion.
    pub fn fuse_frame(&mut self, pose: &Pose, depth: &DepthFrame, color: Option<&ColorFrame>) -> FrameReport {
        let visibility = self.update_visibility(pose, depth);
        let integrated = self.fuse(pose, depth, color);
        FrameReport {
            visibility,
            integrated,
        }
    }

    /// Raycast the current visible set from `pose`.
    pub fn raycast(&self, pose: &Pose) -> RenderOutput {
        let view = self.map_view();
        self.pool
            .install(|| render::raycast(&view, &self.visible, pose, &self.config, &self.warnings))
    }

    /// Render for the tracker's next model-to-frame alignment.
    pub fn render_map(&self, pose: &Pose) -> RenderOutput {
        self.raycast(pose)
    }

    /// Marching cubes over every allocated block.
    pub fn extract_mesh(&self) -> TriangleBuffer {
        let view = self.map_view();
        self.pool.install(|| {
            mesh::extract_mesh(&view, self.config.max_triangles as usize, &self.warnings)
        })
    }

    /// Clear all blocks, voxels, keypoints and counters.
    pub fn reset(&mut self) {
        let Self {
            table,
            heap,
            voxels,
            visible,
            keys,
            warnings,
            pool,
            ..
        } = self;
        pool.install(|| {
            table.reset();
            heap.reset();
            voxels.reset();
            visible.begin_frame();
            keys.reset();
        });
        warnings.reset();
        self.fused_frames = 0;
        log::info!("Voxel map reset");
    }

    pub fn map_view(&self) -> MapView<'_> {
        MapView {
            table: &self.table,
            heap: &self.heap,
            voxels: &self.voxels,
            voxel_size: self.config.voxel_size,
            truncation: self.config.truncation_distance,
        }
    }

    pub fn key_view(&self) -> KeyMapView<'_> {
        KeyMapView::new(&self.keys)
    }

    pub fn keypoints(&self) -> &KeyPointMap {
        &self.keys
    }

    /// Entry indices of the last visibility pass
    pub fn visible_entries(&self) -> &[u32] {
        self.visible.entries()
    }

    pub fn stats(&self) -> MapStats {
        MapStats {
            allocated_blocks: self.table.allocated_count(),
            heap_capacity: self.heap.capacity(),
            free_blocks: self.heap.free_count(),
            excess_used: self.table.excess_used(),
            excess_capacity: self.table.num_excess(),
            visible_entries: self.visible.len(),
            keypoints: self.keys.len(),
            fused_frames: self.fused_frames,
        }
    }

    /// Write the hash table, heap and voxel store.
    pub fn save_to<W: Write>(&self, writer: W, compression: DumpCompression) -> MapResult<()> {
        let (entries, excess_used) = self.table.snapshot();
        let (heap_slots, heap_counter) = self.heap.snapshot();
        let source = DumpSource {
            layout: DumpLayout::from_config(&self.config),
            voxel_size: self.config.voxel_size,
            truncation_distance: self.config.truncation_distance,
            entries: &entries,
            heap_slots: &heap_slots,
            heap_counter,
            excess_used,
            voxels: self.voxels.as_slice(),
        };
        persistence::write_dump(writer, &source, compression)
    }

    /// Replace the map contents with a dump of identical capacities.
    ///
    /// A capacity mismatch is returned before anything is modified. The
    /// visible set and keypoint table are cleared.
    pub fn load_from<R: Read>(&mut self, reader: R) -> MapResult<()> {
        let dump = persistence::read_dump(reader, &DumpLayout::from_config(&self.config))?;

        if dump.voxel_size != self.config.voxel_size
            || dump.truncation_distance != self.config.truncation_distance
        {
            log::warn!(
                "Dump was fused with voxel size {} / truncation {}, map uses {} / {}",
                dump.voxel_size,
                dump.truncation_distance,
                self.config.voxel_size,
                self.config.truncation_distance
            );
        }

        self.table.restore(&dump.entries, dump.excess_used);
        self.heap.restore(&dump.heap_slots, dump.heap_counter);
        self.voxels.as_mut_slice().copy_from_slice(&dump.voxels);
        self.visible.begin_frame();
        self.keys.reset();
        self.warnings.reset();

        log::info!(
            "Loaded map dump: {} blocks allocated, {} free",
            self.heap.used_count(),
            self.heap.free_count()
        );
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>, compression: DumpCompression) -> MapResult<()> {
        let path = path.as_ref();
        persistence::atomic_write(path, |w| self.save_to(w, compression))?;
        log::info!("Saved map to {}", path.display());
        Ok(())
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> MapResult<()> {
        let path = path.as_ref();
        let file = File::open(path).persistence_context(&format!("open {}", path.display()))?;
        self.load_from(BufReader::new(file))
    }

    /// Extract the mesh and write it as binary STL; returns the triangle count.
    pub fn save_mesh(&self, path: impl AsRef<Path>) -> MapResult<usize> {
        let mesh = self.extract_mesh();
        persistence::save_stl(path, &mesh)?;
        Ok(mesh.triangle_count())
    }
}
