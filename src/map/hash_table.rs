//! Fixed-capacity spatial hash over voxel block coordinates
//!
//! Layout: `num_buckets * bucket_size` primary entries, bucket `b` owning the
//! contiguous run starting at `b * bucket_size`, followed by a shared excess
//! list. A bucket's overflow chain hangs off its last primary entry through
//! index links into the excess list; nothing is ever heap-allocated after
//! construction.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::IVec3;
use parking_lot::Mutex;
use rayon::prelude::*;

use super::hash_entry::{EntrySlot, HashEntry};
use super::heap::BlockHeap;

/// Result of `HashTable::try_insert`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Block was already present (possibly inserted by a concurrent worker)
    Existing { entry: u32, slot: i32 },
    /// New entry created and backed by a fresh heap slot
    Inserted { entry: u32, slot: i32 },
    /// No free heap slot; block is not allocated this frame
    HeapExhausted,
    /// Bucket primaries full and the excess list is used up
    ExcessExhausted,
}

impl InsertOutcome {
    pub fn entry(&self) -> Option<u32> {
        match *self {
            InsertOutcome::Existing { entry, .. } | InsertOutcome::Inserted { entry, .. } => Some(entry),
            _ => None,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted { .. })
    }
}

/// Spread a signed block coordinate over the bucket range
#[inline]
pub fn hash_block(coord: IVec3, num_buckets: u32) -> u32 {
    let h = (coord.x as u32).wrapping_mul(73_856_093)
        ^ (coord.y as u32).wrapping_mul(19_349_669)
        ^ (coord.z as u32).wrapping_mul(83_492_791);
    h % num_buckets
}

/// Primary slots plus excess entries, widened so no capacity combination
/// can overflow
#[inline]
pub fn entry_count(num_buckets: u32, bucket_size: u32, num_excess: u32) -> u64 {
    num_buckets as u64 * bucket_size as u64 + num_excess as u64
}

pub struct HashTable {
    num_buckets: u32,
    bucket_size: u32,
    num_excess: u32,
    entries: Vec<EntrySlot>,
    bucket_locks: Vec<Mutex<()>>,
    /// Excess entries handed out so far
    excess_counter: AtomicU32,
}

impl HashTable {
    pub fn new(num_buckets: u32, bucket_size: u32, num_excess: u32) -> Self {
        let total = entry_count(num_buckets, bucket_size, num_excess) as usize;
        Self {
            num_buckets,
            bucket_size,
            num_excess,
            entries: (0..total).map(|_| EntrySlot::empty()).collect(),
            bucket_locks: (0..num_buckets).map(|_| Mutex::new(())).collect(),
            excess_counter: AtomicU32::new(0),
        }
    }

    pub fn num_buckets(&self) -> u32 {
        self.num_buckets
    }

    pub fn bucket_size(&self) -> u32 {
        self.bucket_size
    }

    pub fn num_excess(&self) -> u32 {
        self.num_excess
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn excess_used(&self) -> u32 {
        self.excess_counter.load(Ordering::Acquire)
    }

    fn primary_count(&self) -> usize {
        self.num_buckets as usize * self.bucket_size as usize
    }

    #[inline]
    fn bucket_range(&self, coord: IVec3) -> (u32, usize) {
        let bucket = hash_block(coord, self.num_buckets);
        (bucket, (bucket * self.bucket_size) as usize)
    }

    /// Lock-free search of a bucket and its overflow chain
    fn find(&self, coord: IVec3, base: usize) -> Option<(u32, i32)> {
        let size = self.bucket_size as usize;
        for index in base..base + size {
            if let Some(ptr) = self.entries[index].matches(coord) {
                return Some((index as u32, ptr));
            }
        }

        let mut next = self.entries[base + size - 1].next();
        let mut hops = 0;
        while next != HashEntry::NO_NEXT && hops <= self.num_excess {
            let index = next as usize;
            let slot = self.entries.get(index)?;
            if let Some(ptr) = slot.matches(coord) {
                return Some((index as u32, ptr));
            }
            next = slot.next();
            hops += 1;
        }
        None
    }

    /// Heap slot backing `coord`, if allocated. Never locks.
    #[inline]
    pub fn lookup(&self, coord: IVec3) -> Option<i32> {
        let (_, base) = self.bucket_range(coord);
        self.find(coord, base).map(|(_, ptr)| ptr)
    }

    /// Entry index and heap slot for `coord`, if allocated
    pub fn lookup_entry(&self, coord: IVec3) -> Option<(u32, i32)> {
        let (_, base) = self.bucket_range(coord);
        self.find(coord, base)
    }

    /// Find or create the entry for `coord`.
    ///
    /// The heap slot is claimed before the bucket lock is taken so the lock
    /// is never held across an allocation. Under the lock the bucket is
    /// searched again; if another worker created the block in the meantime
    /// the claimed slot goes back through the heap's deferred release list.
    pub fn try_insert(&self, coord: IVec3, heap: &BlockHeap) -> InsertOutcome {
        let (bucket, base) = self.bucket_range(coord);

        if let Some((entry, slot)) = self.find(coord, base) {
            return InsertOutcome::Existing { entry, slot };
        }

        let Some(new_slot) = heap.pop() else {
            return InsertOutcome::HeapExhausted;
        };

        let _guard = self.bucket_locks[bucket as usize].lock();

        if let Some((entry, slot)) = self.find(coord, base) {
            heap.release_deferred(new_slot);
            return InsertOutcome::Existing { entry, slot };
        }

        let size = self.bucket_size as usize;
        for index in base..base + size {
            if self.entries[index].ptr() == HashEntry::FREE {
                self.entries[index].publish(coord, new_slot);
                return InsertOutcome::Inserted {
                    entry: index as u32,
                    slot: new_slot,
                };
            }
        }

        let claimed = self
            .excess_counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c < self.num_excess).then_some(c + 1)
            });
        let Ok(offset) = claimed else {
            heap.release_deferred(new_slot);
            return InsertOutcome::ExcessExhausted;
        };

        let index = self.primary_count() + offset as usize;
        self.entries[index].publish(coord, new_slot);

        let mut tail = base + size - 1;
        loop {
            let next = self.entries[tail].next();
            if next == HashEntry::NO_NEXT {
                break;
            }
            tail = next as usize;
        }
        self.entries[tail].link(index as i32);

        InsertOutcome::Inserted {
            entry: index as u32,
            slot: new_slot,
        }
    }

    pub fn entry(&self, index: u32) -> Option<HashEntry> {
        self.entries.get(index as usize).map(EntrySlot::snapshot)
    }

    /// Heap slot of an entry without copying the whole snapshot
    #[inline]
    pub(crate) fn entry_ptr(&self, index: u32) -> i32 {
        self.entries
            .get(index as usize)
            .map_or(HashEntry::FREE, EntrySlot::ptr)
    }

    #[inline]
    pub(crate) fn entry_pos(&self, index: u32) -> IVec3 {
        self.entries[index as usize].pos()
    }

    /// Indices and snapshots of every allocated entry, in index order
    pub fn allocated_entries(&self) -> Vec<(u32, HashEntry)> {
        self.entries
            .par_iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let entry = slot.snapshot();
                entry.is_allocated().then_some((i as u32, entry))
            })
            .collect()
    }

    pub fn allocated_count(&self) -> usize {
        self.entries
            .par_iter()
            .filter(|slot| slot.ptr() != HashEntry::FREE)
            .count()
    }

    /// Full table contents and excess counter, for persistence
    pub fn snapshot(&self) -> (Vec<HashEntry>, u32) {
        (
            self.entries.par_iter().map(EntrySlot::snapshot).collect(),
            self.excess_used(),
        )
    }

    /// Overwrite with a snapshot of identical capacity.
    pub(crate) fn restore(&mut self, entries: &[HashEntry], excess_used: u32) {
        self.entries
            .par_iter()
            .zip(entries.par_iter())
            .for_each(|(slot, entry)| slot.store(entry));
        *self.excess_counter.get_mut() = excess_used;
    }

    pub fn reset(&self) {
        self.entries.par_iter().for_each(EntrySlot::clear);
        self.excess_counter.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_then_lookup() {
        let table = HashTable::new(16, 2, 8);
        let heap = BlockHeap::new(32);
        let coord = IVec3::new(3, -4, 5);

        let outcome = table.try_insert(coord, &heap);
        assert!(outcome.is_inserted());
        assert_eq!(table.lookup(coord), Some(0));
        assert_eq!(table.try_insert(coord, &heap), InsertOutcome::Existing { entry: outcome.entry().unwrap(), slot: 0 });
        assert_eq!(table.lookup(IVec3::new(3, -4, 6)), None);
    }

    #[test]
    fn test_single_bucket_overflows_into_excess() {
        let table = HashTable::new(1, 2, 3);
        let heap = BlockHeap::new(16);
        for x in 0..5 {
            assert!(table.try_insert(IVec3::new(x, 0, 0), &heap).is_inserted());
        }
        assert_eq!(table.excess_used(), 3);
        assert_eq!(
            table.try_insert(IVec3::new(99, 0, 0), &heap),
            InsertOutcome::ExcessExhausted
        );
        for x in 0..5 {
            assert!(table.lookup(IVec3::new(x, 0, 0)).is_some());
        }
    }

    #[test]
    fn test_heap_exhaustion_fails_cleanly() {
        let table = HashTable::new(64, 2, 16);
        let heap = BlockHeap::new(2);
        assert!(table.try_insert(IVec3::new(0, 0, 0), &heap).is_inserted());
        assert!(table.try_insert(IVec3::new(1, 0, 0), &heap).is_inserted());
        assert_eq!(table.try_insert(IVec3::new(2, 0, 0), &heap), InsertOutcome::HeapExhausted);
        assert_eq!(table.allocated_count(), 2);
    }

    #[test]
    fn test_reset_clears_entries() {
        let table = HashTable::new(8, 1, 4);
        let heap = BlockHeap::new(8);
        table.try_insert(IVec3::ONE, &heap);
        table.reset();
        assert_eq!(table.lookup(IVec3::ONE), None);
        assert_eq!(table.allocated_count(), 0);
        assert_eq!(table.excess_used(), 0);
    }

    #[test]
    fn test_hash_is_in_range_for_negative_coords() {
        for c in [IVec3::new(-1, -1, -1), IVec3::new(i32::MIN, 0, i32::MAX)] {
            assert!(hash_block(c, 1000) < 1000);
        }
    }
}
