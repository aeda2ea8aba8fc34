//! # Free List
//!
//! Thread-safe min-heap of recycled values.
//!
//! Claiming is split from popping: a caller first reserves one unit of the
//! `available` counter with a CAS loop, and only then locks the heap. A
//! reservation guarantees the heap holds at least one element by the time
//! the lock is taken, so concurrent takers never wait on an empty heap and
//! never over-claim.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Spins between cooperative yields while racing on the claim counter.
const SPINS_PER_YIELD: u32 = 64;

/// Concurrent free list returning the smallest element first.
///
/// `push` inserts and then publishes the element; `try_pop` claims and then
/// removes. The counter therefore never exceeds the heap length.
pub struct FreeList<T: Ord> {
    available: AtomicUsize,
    heap: Mutex<BinaryHeap<Reverse<T>>>,
}

impl<T: Ord> FreeList<T> {
    /// Creates an empty free list with room for `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            available: AtomicUsize::new(0),
            heap: Mutex::new(BinaryHeap::with_capacity(capacity)),
        }
    }

    /// Number of elements that can currently be claimed.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    /// Returns true when nothing can be claimed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a value and makes it claimable.
    pub fn push(&self, value: T) {
        {
            let mut heap = self.heap.lock();
            if heap.len() == heap.capacity() {
                // Double ahead of time so pushes amortize like a Vec.
                let extra = heap.capacity().max(16);
                heap.reserve(extra);
            }
            heap.push(Reverse(value));
        }
        self.available.fetch_add(1, Ordering::Release);
    }

    /// Removes and returns the smallest value, or `None` when empty.
    pub fn try_pop(&self) -> Option<T> {
        if !self.claim() {
            return None;
        }
        self.heap.lock().pop().map(|Reverse(value)| value)
    }

    /// Drops every element.
    pub fn clear(&self) {
        let mut heap = self.heap.lock();
        heap.clear();
        self.available.store(0, Ordering::Release);
    }

    fn claim(&self) -> bool {
        let mut spins = 0_u32;
        let mut current = self.available.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.available.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => {
                    current = observed;
                    spins += 1;
                    if spins % SPINS_PER_YIELD == 0 {
                        std::thread::yield_now();
                    } else {
                        std::hint::spin_loop();
                    }
                }
            }
        }
    }
}

impl<T: Ord> Default for FreeList<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<T: Ord> std::fmt::Debug for FreeList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreeList")
            .field("available", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_pops_smallest_first() {
        let list = FreeList::with_capacity(4);
        list.push(9);
        list.push(3);
        list.push(5);

        assert_eq!(list.len(), 3);
        assert_eq!(list.try_pop(), Some(3));
        assert_eq!(list.try_pop(), Some(5));
        assert_eq!(list.try_pop(), Some(9));
        assert_eq!(list.try_pop(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let list = FreeList::with_capacity(1);
        for value in (0..100).rev() {
            list.push(value);
        }
        assert_eq!(list.len(), 100);
        assert_eq!(list.try_pop(), Some(0));
    }

    #[test]
    fn test_concurrent_pops_never_duplicate() {
        let list = Arc::new(FreeList::with_capacity(1000));
        for value in 0..1000 {
            list.push(value);
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let list = Arc::clone(&list);
                std::thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(value) = list.try_pop() {
                        taken.push(value);
                    }
                    taken
                })
            })
            .collect();

        let mut all: Vec<i32> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
    }
}
