use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

/// Entries touched by the current frame
///
/// Workers mark entries through per-entry atomic flags; `compact` then turns
/// the flags into a dense, index-ordered list capped at `capacity`.
pub struct VisibleEntrySet {
    flags: Vec<AtomicBool>,
    entries: Vec<u32>,
    capacity: usize,
}

impl VisibleEntrySet {
    pub fn new(num_entries: usize, capacity: usize) -> Self {
        Self {
            flags: (0..num_entries).map(|_| AtomicBool::new(false)).collect(),
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Flag an entry; true if this call was the first to flag it this frame.
    #[inline]
    pub fn mark(&self, entry: u32) -> bool {
        match self.flags.get(entry as usize) {
            Some(flag) => !flag.swap(true, Ordering::AcqRel),
            None => false,
        }
    }

    #[inline]
    pub fn is_marked(&self, entry: u32) -> bool {
        self.flags
            .get(entry as usize)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Drop last frame's flags and list.
    pub fn begin_frame(&mut self) {
        self.flags
            .par_iter_mut()
            .for_each(|flag| *flag.get_mut() = false);
        self.entries.clear();
    }

    /// Gather flagged entries in index order. Returns how many were dropped
    /// for lack of capacity.
    pub fn compact(&mut self) -> usize {
        let marked: Vec<u32> = self
            .flags
            .par_iter()
            .enumerate()
            .filter_map(|(i, flag)| flag.load(Ordering::Acquire).then_some(i as u32))
            .collect();

        let kept = marked.len().min(self.capacity);
        self.entries.clear();
        self.entries.extend_from_slice(&marked[..kept]);
        marked.len() - kept
    }

    /// Replace the list directly, e.g. after a reload.
    pub(crate) fn set_entries(&mut self, entries: &[u32]) {
        self.begin_frame();
        for &entry in entries.iter().take(self.capacity) {
            self.mark(entry);
        }
        self.compact();
    }

    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_compact_in_index_order() {
        let mut set = VisibleEntrySet::new(16, 16);
        assert!(set.mark(9));
        assert!(set.mark(2));
        assert!(!set.mark(9));
        assert!(!set.mark(99));
        assert_eq!(set.compact(), 0);
        assert_eq!(set.entries(), &[2, 9]);
    }

    #[test]
    fn test_compact_caps_at_capacity() {
        let mut set = VisibleEntrySet::new(10, 3);
        for i in 0..10 {
            set.mark(i);
        }
        assert_eq!(set.compact(), 7);
        assert_eq!(set.entries(), &[0, 1, 2]);
    }

    #[test]
    fn test_begin_frame_discards_previous() {
        let mut set = VisibleEntrySet::new(4, 4);
        set.mark(1);
        set.compact();
        set.begin_frame();
        assert!(set.is_empty());
        assert!(!set.is_marked(1));
    }
}
