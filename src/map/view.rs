use glam::{IVec3, Vec3};

use super::{
    local_index, voxel_to_block, voxel_to_local, BlockHeap, HashTable, Voxel, VoxelStore,
    BLOCK_SIZE,
};

/// Read-only projection of the map handed to render and mesh passes
#[derive(Clone, Copy)]
pub struct MapView<'a> {
    pub table: &'a HashTable,
    pub heap: &'a BlockHeap,
    pub voxels: &'a VoxelStore,
    pub voxel_size: f32,
    pub truncation: f32,
}

impl<'a> MapView<'a> {
    /// Voxels of an allocated block
    #[inline]
    pub fn block(&self, coord: IVec3) -> Option<&'a [Voxel]> {
        let slot = self.table.lookup(coord)?;
        self.voxels.block(slot)
    }

    #[inline]
    pub fn is_allocated(&self, coord: IVec3) -> bool {
        self.table.lookup(coord).is_some()
    }

    pub fn block_world_size(&self) -> f32 {
        self.voxel_size * BLOCK_SIZE as f32
    }

    /// Voxel at a global index, `None` if its block is unallocated
    #[inline]
    pub fn voxel(&self, global: IVec3) -> Option<Voxel> {
        let block = self.block(voxel_to_block(global))?;
        Some(block[local_index(voxel_to_local(global))])
    }

    /// The eight voxels at `base + {0,1}^3`, x fastest
    fn corners(&self, base: IVec3) -> Option<[Voxel; 8]> {
        let local = voxel_to_local(base);
        let mut out = [Voxel::EMPTY; 8];

        if local.cmplt(IVec3::splat(BLOCK_SIZE - 1)).all() {
            let block = self.block(voxel_to_block(base))?;
            for (i, v) in out.iter_mut().enumerate() {
                *v = block[local_index(local + corner_offset(i))];
            }
        } else {
            for (i, v) in out.iter_mut().enumerate() {
                *v = self.voxel(base + corner_offset(i))?;
            }
        }
        Some(out)
    }

    /// Trilinear TSDF and color at a world point. `None` if any of the eight
    /// surrounding voxels is unallocated or unobserved.
    pub fn sample(&self, p: Vec3) -> Option<(f32, Vec3)> {
        let g = p / self.voxel_size;
        let base = g.floor();
        let t = g - base;
        let corners = self.corners(base.as_ivec3())?;

        let mut sdf = 0.0;
        let mut color = Vec3::ZERO;
        for (i, voxel) in corners.iter().enumerate() {
            if !voxel.is_observed() {
                return None;
            }
            let o = corner_offset(i);
            let w = (if o.x == 1 { t.x } else { 1.0 - t.x })
                * (if o.y == 1 { t.y } else { 1.0 - t.y })
                * (if o.z == 1 { t.z } else { 1.0 - t.z });
            sdf += voxel.sdf * w;
            let [r, g, b] = voxel.rgb();
            color += Vec3::new(r as f32, g as f32, b as f32) * w;
        }
        Some((sdf, color))
    }

    #[inline]
    pub fn sample_sdf(&self, p: Vec3) -> Option<f32> {
        self.sample(p).map(|(sdf, _)| sdf)
    }

    /// Unit surface normal from central differences one voxel apart
    pub fn gradient(&self, p: Vec3) -> Option<Vec3> {
        let h = self.voxel_size;
        let dx = self.sample_sdf(p + Vec3::X * h)? - self.sample_sdf(p - Vec3::X * h)?;
        let dy = self.sample_sdf(p + Vec3::Y * h)? - self.sample_sdf(p - Vec3::Y * h)?;
        let dz = self.sample_sdf(p + Vec3::Z * h)? - self.sample_sdf(p - Vec3::Z * h)?;
        Vec3::new(dx, dy, dz).try_normalize()
    }

    /// Every allocated block with its heap slot
    pub fn allocated_blocks(&self) -> Vec<(IVec3, i32)> {
        self.table
            .allocated_entries()
            .into_iter()
            .map(|(_, e)| (e.block_coord(), e.ptr))
            .collect()
    }
}

#[inline]
fn corner_offset(i: usize) -> IVec3 {
    IVec3::new((i & 1) as i32, ((i >> 1) & 1) as i32, ((i >> 2) & 1) as i32)
}
