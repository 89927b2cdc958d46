use std::sync::atomic::{AtomicI32, Ordering};

use bytemuck::{Pod, Zeroable};
use glam::IVec3;

/// Snapshot of one hash table slot
///
/// This is the layout written to disk and handed out by `MapView`. The live
/// table stores the same fields as atomics in `EntrySlot`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct HashEntry {
    pub pos: [i32; 3],
    /// Heap slot index, or `HashEntry::FREE`
    pub ptr: i32,
    /// Index of the next entry in the bucket chain, or `HashEntry::NO_NEXT`
    pub next: i32,
}

impl HashEntry {
    pub const FREE: i32 = -1;
    pub const NO_NEXT: i32 = -1;

    pub const EMPTY: Self = Self {
        pos: [0; 3],
        ptr: Self::FREE,
        next: Self::NO_NEXT,
    };

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.ptr != Self::FREE
    }

    #[inline]
    pub fn block_coord(&self) -> IVec3 {
        IVec3::from_array(self.pos)
    }
}

/// Live hash table slot
///
/// Writers fill `pos` and `next` before publishing `ptr` with release
/// ordering; readers load `ptr` with acquire before trusting `pos`.
pub(crate) struct EntrySlot {
    pos: [AtomicI32; 3],
    ptr: AtomicI32,
    next: AtomicI32,
}

impl EntrySlot {
    pub(crate) fn empty() -> Self {
        Self {
            pos: [AtomicI32::new(0), AtomicI32::new(0), AtomicI32::new(0)],
            ptr: AtomicI32::new(HashEntry::FREE),
            next: AtomicI32::new(HashEntry::NO_NEXT),
        }
    }

    #[inline]
    pub(crate) fn ptr(&self) -> i32 {
        self.ptr.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn next(&self) -> i32 {
        self.next.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn pos(&self) -> IVec3 {
        IVec3::new(
            self.pos[0].load(Ordering::Relaxed),
            self.pos[1].load(Ordering::Relaxed),
            self.pos[2].load(Ordering::Relaxed),
        )
    }

    /// Allocated entry holding `coord`, checked in publish order
    #[inline]
    pub(crate) fn matches(&self, coord: IVec3) -> Option<i32> {
        let ptr = self.ptr();
        if ptr != HashEntry::FREE && self.pos() == coord {
            Some(ptr)
        } else {
            None
        }
    }

    /// Fill and publish. Caller holds the bucket lock.
    pub(crate) fn publish(&self, coord: IVec3, ptr: i32) {
        self.pos[0].store(coord.x, Ordering::Relaxed);
        self.pos[1].store(coord.y, Ordering::Relaxed);
        self.pos[2].store(coord.z, Ordering::Relaxed);
        self.next.store(HashEntry::NO_NEXT, Ordering::Relaxed);
        self.ptr.store(ptr, Ordering::Release);
    }

    /// Append to the chain. Caller holds the bucket lock.
    pub(crate) fn link(&self, next: i32) {
        self.next.store(next, Ordering::Release);
    }

    pub(crate) fn snapshot(&self) -> HashEntry {
        let ptr = self.ptr();
        HashEntry {
            pos: self.pos().to_array(),
            ptr,
            next: self.next(),
        }
    }

    pub(crate) fn store(&self, entry: &HashEntry) {
        self.pos[0].store(entry.pos[0], Ordering::Relaxed);
        self.pos[1].store(entry.pos[1], Ordering::Relaxed);
        self.pos[2].store(entry.pos[2], Ordering::Relaxed);
        self.next.store(entry.next, Ordering::Relaxed);
        self.ptr.store(entry.ptr, Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        self.store(&HashEntry::EMPTY);
    }
}
