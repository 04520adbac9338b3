//! The bump allocator itself.

use std::fmt;
use std::mem;

use tracing::trace;

use crate::error::ArenaError;

/// A linear bump allocator over an externally owned byte buffer.
///
/// The arena keeps the unused tail of the buffer and splits each
/// allocation off its front, so returned regions are disjoint by
/// construction and all live for `'buf`. The bytes are handed out as
/// they are in the buffer: nothing is zeroed.
///
/// Invariant: `offset() + remaining() == capacity()`, and `offset()`
/// never decreases.
pub struct Arena<'buf> {
    /// Unused tail of the buffer. Everything before it has been handed out.
    remaining: &'buf mut [u8],
    /// Length of the buffer the arena was built over.
    capacity: usize,
}

impl<'buf> Arena<'buf> {
    /// Bind an arena to `buffer` with the offset at zero.
    ///
    /// The arena borrows the buffer exclusively for `'buf`; the buffer
    /// becomes usable again (or can back a fresh arena) once the arena
    /// and all regions it returned are gone.
    pub fn new(buffer: &'buf mut [u8]) -> Self {
        let capacity = buffer.len();
        Self {
            remaining: buffer,
            capacity,
        }
    }

    /// Reserve exactly `size` bytes.
    ///
    /// Returns `None` when `offset + size > capacity`; the arena is left
    /// unchanged in that case. A zero-sized request always succeeds and
    /// does not advance the offset.
    pub fn alloc(&mut self, size: usize) -> Option<&'buf mut [u8]> {
        self.try_alloc(size).ok()
    }

    /// Like [`alloc`](Self::alloc), reporting exhaustion as an error.
    pub fn try_alloc(&mut self, size: usize) -> Result<&'buf mut [u8], ArenaError> {
        if size > self.remaining.len() {
            return Err(self.out_of_space(size));
        }
        Ok(self.carve(0, size))
    }

    /// Reserve `size` bytes starting at an address that is a multiple of
    /// `align`.
    ///
    /// Padding up to the next aligned address is consumed together with
    /// the region, and only if the whole request fits.
    pub fn alloc_aligned(&mut self, size: usize, align: usize) -> Option<&'buf mut [u8]> {
        self.try_alloc_aligned(size, align).ok()
    }

    /// Like [`alloc_aligned`](Self::alloc_aligned), reporting failures as
    /// errors.
    pub fn try_alloc_aligned(
        &mut self,
        size: usize,
        align: usize,
    ) -> Result<&'buf mut [u8], ArenaError> {
        let Some(padding) = self.padding_for(align) else {
            return Err(ArenaError::InvalidAlignment { align });
        };
        match padding.checked_add(size) {
            Some(total) if total <= self.remaining.len() => Ok(self.carve(padding, size)),
            _ => Err(self.out_of_space(size.saturating_add(padding))),
        }
    }

    /// Bytes of padding an allocation aligned to `align` would consume
    /// right now, or `None` if `align` is not a power of two.
    pub fn padding_for(&self, align: usize) -> Option<usize> {
        if !align.is_power_of_two() {
            return None;
        }
        let addr = self.remaining.as_ptr() as usize;
        Some(addr.wrapping_neg() & (align - 1))
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn offset(&self) -> usize {
        self.capacity - self.remaining.len()
    }

    /// Total size of the backing buffer in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Whether no further non-empty allocation can succeed.
    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Split `padding + size` bytes off the front of the tail and return
    /// the last `size` of them.
    ///
    /// Callers have checked that `padding + size <= remaining`.
    fn carve(&mut self, padding: usize, size: usize) -> &'buf mut [u8] {
        let tail = mem::take(&mut self.remaining);
        let (_pad, tail) = tail.split_at_mut(padding);
        let (block, tail) = tail.split_at_mut(size);
        self.remaining = tail;
        block
    }

    pub(crate) fn out_of_space(&self, requested: usize) -> ArenaError {
        let remaining = self.remaining.len();
        trace!(requested, remaining, capacity = self.capacity, "arena exhausted");
        ArenaError::OutOfSpace {
            requested,
            remaining,
        }
    }
}

impl fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("offset", &self.offset())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_arena_starts_at_zero() {
        let mut buf = [0u8; 64];
        let arena = Arena::new(&mut buf);
        assert_eq!(arena.offset(), 0);
        assert_eq!(arena.capacity(), 64);
        assert_eq!(arena.remaining(), 64);
    }

    #[test]
    fn sequential_allocs_are_adjacent() {
        let mut buf = [0u8; 64];
        let base = buf.as_ptr() as usize;
        let mut arena = Arena::new(&mut buf);
        let a = arena.alloc(10).unwrap();
        let b = arena.alloc(20).unwrap();
        assert_eq!(a.len(), 10);
        assert_eq!(b.len(), 20);
        assert_eq!(a.as_ptr() as usize, base);
        assert_eq!(b.as_ptr() as usize, base + 10);
        assert_eq!(arena.offset(), 30);
    }

    #[test]
    fn allocations_do_not_alias() {
        let mut buf = [0u8; 16];
        let mut arena = Arena::new(&mut buf);
        let a = arena.alloc(8).unwrap();
        let b = arena.alloc(8).unwrap();
        a.fill(1);
        b.fill(2);
        assert!(a.iter().all(|&x| x == 1));
        assert!(b.iter().all(|&x| x == 2));
    }

    #[test]
    fn bytes_are_not_zeroed() {
        let mut buf = [0xABu8; 8];
        let mut arena = Arena::new(&mut buf);
        let region = arena.alloc(8).unwrap();
        assert!(region.iter().all(|&x| x == 0xAB));
    }

    #[test]
    fn last_byte_is_reachable_exactly_once() {
        let mut buf = [0u8; 32];
        let mut arena = Arena::new(&mut buf);
        arena.alloc(20).unwrap();
        let rest = arena.remaining();
        assert!(arena.alloc(rest + 1).is_none());
        assert_eq!(arena.offset(), 20);
        assert_eq!(arena.alloc(rest).unwrap().len(), 12);
        assert!(arena.is_exhausted());
        assert!(arena.alloc(1).is_none());
    }

    #[test]
    fn failed_alloc_leaves_offset_unchanged() {
        let mut buf = [0u8; 16];
        let mut arena = Arena::new(&mut buf);
        arena.alloc(4).unwrap();
        let err = arena.try_alloc(100).unwrap_err();
        assert_eq!(
            err,
            ArenaError::OutOfSpace {
                requested: 100,
                remaining: 12
            }
        );
        assert_eq!(arena.offset(), 4);
    }

    #[test]
    fn zero_size_alloc_succeeds_without_advancing() {
        let mut buf = [0u8; 4];
        let mut arena = Arena::new(&mut buf);
        arena.alloc(4).unwrap();
        let empty = arena.alloc(0).unwrap();
        assert!(empty.is_empty());
        assert_eq!(arena.offset(), 4);
    }

    #[test]
    fn empty_buffer_only_serves_zero_sized_requests() {
        let mut buf: [u8; 0] = [];
        let mut arena = Arena::new(&mut buf);
        assert!(arena.alloc(0).is_some());
        assert!(arena.alloc(1).is_none());
    }

    #[test]
    fn rebinding_the_buffer_starts_over() {
        let mut buf = [0u8; 8];
        {
            let mut arena = Arena::new(&mut buf);
            arena.alloc(8).unwrap().fill(7);
            assert!(arena.is_exhausted());
        }
        let mut arena = Arena::new(&mut buf);
        assert_eq!(arena.offset(), 0);
        assert_eq!(arena.alloc(8).unwrap()[0], 7);
    }

    #[test]
    fn aligned_alloc_returns_aligned_address() {
        let mut buf = [0u8; 128];
        let mut arena = Arena::new(&mut buf);
        arena.alloc(3).unwrap();
        let block = arena.alloc_aligned(16, 16).unwrap();
        assert_eq!(block.as_ptr() as usize % 16, 0);
        assert_eq!(block.len(), 16);
    }

    #[test]
    fn aligned_alloc_counts_padding_in_offset() {
        let mut buf = [0u8; 128];
        let mut arena = Arena::new(&mut buf);
        arena.alloc(1).unwrap();
        let padding = arena.padding_for(8).unwrap();
        arena.alloc_aligned(8, 8).unwrap();
        assert_eq!(arena.offset(), 1 + padding + 8);
    }

    #[test]
    fn aligned_failure_does_not_consume_padding() {
        let mut buf = [0u8; 16];
        let mut arena = Arena::new(&mut buf);
        arena.alloc(1).unwrap();
        assert!(arena.alloc_aligned(64, 8).is_none());
        assert_eq!(arena.offset(), 1);
    }

    #[test]
    fn non_power_of_two_alignment_is_rejected() {
        let mut buf = [0u8; 16];
        let mut arena = Arena::new(&mut buf);
        assert_eq!(
            arena.try_alloc_aligned(4, 3).unwrap_err(),
            ArenaError::InvalidAlignment { align: 3 }
        );
        assert_eq!(
            arena.try_alloc_aligned(4, 0).unwrap_err(),
            ArenaError::InvalidAlignment { align: 0 }
        );
        assert_eq!(arena.offset(), 0);
    }

    #[test]
    fn padding_for_rejects_invalid_alignment() {
        let mut buf = [0u8; 16];
        let mut arena = Arena::new(&mut buf);
        assert_eq!(arena.padding_for(0), None);
        assert_eq!(arena.padding_for(12), None);
        assert_eq!(arena.padding_for(1), Some(0));
        arena.alloc(1).unwrap();
        assert!(arena.padding_for(4).is_some_and(|p| p < 4));
    }

    #[test]
    fn debug_reports_offset_and_capacity() {
        let mut buf = [0u8; 10];
        let mut arena = Arena::new(&mut buf);
        arena.alloc(3).unwrap();
        assert_eq!(format!("{arena:?}"), "Arena { offset: 3, capacity: 10 }");
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn successful_allocs_are_disjoint_and_in_bounds(
                sizes in proptest::collection::vec(0usize..64, 1..32),
            ) {
                let mut buf = vec![0u8; 512];
                let base = buf.as_ptr() as usize;
                let capacity = buf.len();
                let mut arena = Arena::new(&mut buf);
                let mut spans: Vec<(usize, usize)> = Vec::new();
                let mut expected_offset = 0usize;
                for &size in &sizes {
                    let before = arena.offset();
                    match arena.alloc(size) {
                        Some(region) => {
                            let start = region.as_ptr() as usize - base;
                            prop_assert_eq!(region.len(), size);
                            prop_assert!(start + size <= capacity);
                            prop_assert_eq!(start, before);
                            spans.push((start, start + size));
                            expected_offset += size;
                        }
                        None => {
                            prop_assert!(before + size > capacity);
                            prop_assert_eq!(arena.offset(), before);
                        }
                    }
                    prop_assert_eq!(arena.offset() + arena.remaining(), capacity);
                }
                prop_assert_eq!(arena.offset(), expected_offset);
                for (i, a) in spans.iter().enumerate() {
                    for b in &spans[i + 1..] {
                        let overlap = a.0 < b.1 && b.0 < a.1;
                        prop_assert!(!overlap, "{:?} overlaps {:?}", a, b);
                    }
                }
            }

            #[test]
            fn exhaustion_boundary_is_exact(capacity in 1usize..256, used in 0usize..256) {
                let used = used.min(capacity);
                let mut buf = vec![0u8; capacity];
                let mut arena = Arena::new(&mut buf);
                arena.alloc(used).unwrap();
                let rest = capacity - used;
                prop_assert!(arena.alloc(rest + 1).is_none());
                prop_assert_eq!(arena.offset(), used);
                let last = arena.alloc(rest).unwrap();
                prop_assert_eq!(last.len(), rest);
                prop_assert_eq!(arena.offset(), capacity);
            }

            #[test]
            fn aligned_regions_respect_alignment(
                requests in proptest::collection::vec((0usize..32, 0u32..6), 1..16),
            ) {
                let mut buf = vec![0u8; 1024];
                let mut arena = Arena::new(&mut buf);
                for &(size, shift) in &requests {
                    let align = 1usize << shift;
                    if let Some(region) = arena.alloc_aligned(size, align) {
                        prop_assert_eq!(region.as_ptr() as usize % align, 0);
                        prop_assert_eq!(region.len(), size);
                    }
                }
            }
        }
    }
}
