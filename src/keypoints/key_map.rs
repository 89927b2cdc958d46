use glam::{IVec3, Vec3};
use parking_lot::RwLock;
use rayon::prelude::*;

use crate::map::hash_table::hash_block;

/// Sparse feature anchored in the map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub descriptor: [u8; 32],
    pub position: Vec3,
    pub normal: Vec3,
    pub valid: bool,
}

impl KeyPoint {
    pub fn new(descriptor: [u8; 32], position: Vec3, normal: Vec3) -> Self {
        Self {
            descriptor,
            position,
            normal,
            valid: true,
        }
    }
}

/// Result of `KeyPointMap::insert`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInsert {
    Inserted,
    /// A key already occupied the same cell and was overwritten
    Updated,
    /// Bucket full
    Full,
}

/// Fixed-capacity slots of one bucket
struct KeyBucket {
    cells: Vec<IVec3>,
    keys: Vec<KeyPoint>,
    capacity: usize,
}

impl KeyBucket {
    fn new(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
            keys: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn position(&self, cell: IVec3) -> Option<usize> {
        self.cells.iter().position(|&c| c == cell)
    }

    fn clear(&mut self) {
        self.cells.clear();
        self.keys.clear();
    }
}

/// Keypoints hashed by the spatial cell of their position, one key per cell
pub struct KeyPointMap {
    buckets: Vec<RwLock<KeyBucket>>,
    cell_size: f32,
}

impl KeyPointMap {
    pub fn new(num_buckets: u32, bucket_size: u32, cell_size: f32) -> Self {
        Self {
            buckets: (0..num_buckets)
                .map(|_| RwLock::new(KeyBucket::new(bucket_size as usize)))
                .collect(),
            cell_size,
        }
    }

    pub fn cell_of(&self, position: Vec3) -> IVec3 {
        (position / self.cell_size).floor().as_ivec3()
    }

    fn bucket(&self, cell: IVec3) -> &RwLock<KeyBucket> {
        &self.buckets[hash_block(cell, self.buckets.len() as u32) as usize]
    }

    /// Store a key in the cell of its position, replacing any key already there.
    pub fn insert(&self, key: KeyPoint) -> KeyInsert {
        let cell = self.cell_of(key.position);
        let mut bucket = self.bucket(cell).write();
        if let Some(i) = bucket.position(cell) {
            bucket.keys[i] = key;
            return KeyInsert::Updated;
        }
        if bucket.cells.len() >= bucket.capacity {
            return KeyInsert::Full;
        }
        bucket.cells.push(cell);
        bucket.keys.push(key);
        KeyInsert::Inserted
    }

    /// Key stored in the cell containing `position`
    pub fn lookup(&self, position: Vec3) -> Option<KeyPoint> {
        let cell = self.cell_of(position);
        let bucket = self.bucket(cell).read();
        bucket.position(cell).map(|i| bucket.keys[i])
    }

    pub fn remove(&self, position: Vec3) -> Option<KeyPoint> {
        let cell = self.cell_of(position);
        let mut bucket = self.bucket(cell).write();
        let i = bucket.position(cell)?;
        bucket.cells.swap_remove(i);
        Some(bucket.keys.swap_remove(i))
    }

    /// Every valid key, in bucket order
    pub fn collect_keys(&self) -> Vec<KeyPoint> {
        self.buckets
            .par_iter()
            .flat_map_iter(|bucket| {
                let bucket = bucket.read();
                bucket.keys.iter().filter(|k| k.valid).copied().collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.par_iter().map(|b| b.read().keys.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.buckets.iter().map(|b| b.read().capacity).sum()
    }

    pub fn reset(&self) {
        self.buckets.par_iter().for_each(|b| b.write().clear());
    }
}
