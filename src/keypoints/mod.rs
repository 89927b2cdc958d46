/// Keypoint Table
///
/// A small spatial hash of feature descriptors for the tracker's
/// map-to-frame matching. Keys are bucketed by the cell of their position;
/// each cell holds at most one key.

pub mod key_map;

pub use key_map::{KeyInsert, KeyPoint, KeyPointMap};

use glam::Vec3;

/// Read-only projection of the keypoint table
#[derive(Clone, Copy)]
pub struct KeyMapView<'a> {
    keys: &'a KeyPointMap,
}

impl<'a> KeyMapView<'a> {
    pub fn new(keys: &'a KeyPointMap) -> Self {
        Self { keys }
    }

    pub fn lookup(&self, position: Vec3) -> Option<KeyPoint> {
        self.keys.lookup(position)
    }

    pub fn collect_keys(&self) -> Vec<KeyPoint> {
        self.keys.collect_keys()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
