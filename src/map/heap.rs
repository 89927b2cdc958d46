use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use parking_lot::Mutex;

/// Free-slot pool for voxel blocks
///
/// A stack of free slot indices with an atomic top-of-stack counter. Workers
/// pop concurrently; a slot won by the loser of an allocation race goes to a
/// deferred release list and rejoins the stack when the pass finishes, so a
/// push never races a pop on the same stack position.
pub struct BlockHeap {
    slots: Vec<AtomicI32>,
    /// Number of free slots; the next pop reads `slots[counter - 1]`
    counter: AtomicU32,
    released: Mutex<Vec<i32>>,
}

impl BlockHeap {
    pub fn new(capacity: u32) -> Self {
        let heap = Self {
            slots: (0..capacity).map(|_| AtomicI32::new(0)).collect(),
            counter: AtomicU32::new(0),
            released: Mutex::new(Vec::new()),
        };
        heap.reset();
        heap
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Free slots available to `pop`
    pub fn free_count(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    pub fn used_count(&self) -> u32 {
        self.capacity() - self.free_count() - self.pending_release() as u32
    }

    /// Claim a free slot. `None` means the heap is exhausted for this pass.
    #[inline]
    pub fn pop(&self) -> Option<i32> {
        let top = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .ok()?;
        Some(self.slots[(top - 1) as usize].load(Ordering::Acquire))
    }

    /// Give back a slot claimed during the current pass.
    pub fn release_deferred(&self, slot: i32) {
        self.released.lock().push(slot);
    }

    pub fn pending_release(&self) -> usize {
        self.released.lock().len()
    }

    /// Push every deferred slot back onto the stack. Called between passes.
    pub fn reclaim(&mut self) -> usize {
        let released = std::mem::take(self.released.get_mut());
        let count = released.len();
        for slot in released {
            let top = *self.counter.get_mut() as usize;
            *self.slots[top].get_mut() = slot;
            *self.counter.get_mut() += 1;
        }
        count
    }

    /// All slots free, handed out in ascending order.
    pub fn reset(&self) {
        let capacity = self.slots.len();
        for (i, slot) in self.slots.iter().enumerate() {
            slot.store((capacity - 1 - i) as i32, Ordering::Relaxed);
        }
        self.released.lock().clear();
        self.counter.store(capacity as u32, Ordering::Release);
    }

    /// Raw stack contents and counter, for persistence
    pub fn snapshot(&self) -> (Vec<i32>, u32) {
        let slots = self.slots.iter().map(|s| s.load(Ordering::Acquire)).collect();
        (slots, self.free_count())
    }

    /// Restore a snapshot taken with the same capacity.
    pub(crate) fn restore(&mut self, slots: &[i32], counter: u32) {
        for (dst, &src) in self.slots.iter_mut().zip(slots) {
            *dst.get_mut() = src;
        }
        self.released.get_mut().clear();
        *self.counter.get_mut() = counter;
    }
}
