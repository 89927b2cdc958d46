use rayon::prelude::*;

use super::{Voxel, BLOCK_VOLUME};

/// Voxel storage for every heap slot, one contiguous `BLOCK_VOLUME` run each
pub struct VoxelStore {
    voxels: Vec<Voxel>,
}

impl VoxelStore {
    pub fn new(num_blocks: u32) -> Self {
        Self {
            voxels: vec![Voxel::EMPTY; num_blocks as usize * BLOCK_VOLUME],
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.voxels.len() / BLOCK_VOLUME
    }

    #[inline]
    pub fn block(&self, slot: i32) -> Option<&[Voxel]> {
        let start = usize::try_from(slot).ok()? * BLOCK_VOLUME;
        self.voxels.get(start..start + BLOCK_VOLUME)
    }

    #[inline]
    pub fn block_mut(&mut self, slot: i32) -> Option<&mut [Voxel]> {
        let start = usize::try_from(slot).ok()? * BLOCK_VOLUME;
        self.voxels.get_mut(start..start + BLOCK_VOLUME)
    }

    /// Parallel iterator over (slot, block) pairs
    pub fn par_blocks_mut(&mut self) -> impl IndexedParallelIterator<Item = (usize, &mut [Voxel])> {
        self.voxels.par_chunks_mut(BLOCK_VOLUME).enumerate()
    }

    pub fn as_slice(&self) -> &[Voxel] {
        &self.voxels
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Voxel] {
        &mut self.voxels
    }

    pub fn reset(&mut self) {
        self.voxels.par_iter_mut().for_each(|v| *v = Voxel::EMPTY);
    }
}
