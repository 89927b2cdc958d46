/// Sparse Voxel Block Map
///
/// Fixed-capacity storage for the fused TSDF volume.
///
/// Key pieces:
/// - `HashTable`: block coordinate -> heap slot, bucket-locked inserts, lock-free lookups
/// - `BlockHeap`: free-slot stack with an atomic counter
/// - `VoxelStore`: one `BLOCK_VOLUME` run of voxels per heap slot
/// - `VisibleEntrySet`: entries touched by the current frame
/// - `MapView`: read-only projection handed to the render and mesh passes

pub mod capacity;
pub mod hash_entry;
pub mod hash_table;
pub mod heap;
pub mod view;
pub mod visible;
pub mod voxel;
pub mod voxel_store;

pub use capacity::{CapacityClass, CapacityWarnings};
pub use hash_entry::HashEntry;
pub use hash_table::{HashTable, InsertOutcome};
pub use heap::BlockHeap;
pub use view::MapView;
pub use visible::VisibleEntrySet;
pub use voxel::Voxel;
pub use voxel_store::VoxelStore;

use glam::{IVec3, Vec3};

/// Voxels along one edge of a block
pub const BLOCK_SIZE: i32 = 8;

/// Voxels per block
pub const BLOCK_VOLUME: usize = (BLOCK_SIZE * BLOCK_SIZE * BLOCK_SIZE) as usize;

/// Global voxel index containing a world-space point
#[inline]
pub fn world_to_voxel(p: Vec3, voxel_size: f32) -> IVec3 {
    (p / voxel_size).floor().as_ivec3()
}

/// Block coordinate containing a world-space point
#[inline]
pub fn world_to_block(p: Vec3, voxel_size: f32) -> IVec3 {
    (p / (voxel_size * BLOCK_SIZE as f32)).floor().as_ivec3()
}

/// Block coordinate containing a global voxel index
#[inline]
pub fn voxel_to_block(voxel: IVec3) -> IVec3 {
    voxel.div_euclid(IVec3::splat(BLOCK_SIZE))
}

/// Offset of a global voxel index within its block
#[inline]
pub fn voxel_to_local(voxel: IVec3) -> IVec3 {
    voxel.rem_euclid(IVec3::splat(BLOCK_SIZE))
}

/// Linear index of a local voxel offset, x fastest
#[inline]
pub fn local_index(local: IVec3) -> usize {
    (local.x + local.y * BLOCK_SIZE + local.z * BLOCK_SIZE * BLOCK_SIZE) as usize
}

/// Inverse of `local_index`
#[inline]
pub fn local_offset(index: usize) -> IVec3 {
    let i = index as i32;
    IVec3::new(
        i % BLOCK_SIZE,
        (i / BLOCK_SIZE) % BLOCK_SIZE,
        i / (BLOCK_SIZE * BLOCK_SIZE),
    )
}

/// World position of a global voxel index (voxel corner)
#[inline]
pub fn voxel_to_world(voxel: IVec3, voxel_size: f32) -> Vec3 {
    voxel.as_vec3() * voxel_size
}

#[cfg(test)]
mod tests;
