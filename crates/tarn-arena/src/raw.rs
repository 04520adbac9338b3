//! Typed carving on top of the byte-level bump allocator.
//!
//! The only `unsafe` in this crate lives here. Each block carries a
//! `// SAFETY:` comment and the public surface stays safe: callers get
//! back an initialised `&'buf mut [T]`.

#![allow(unsafe_code)]

use std::mem::{self, align_of, size_of};
use std::ptr::NonNull;
use std::slice;

use crate::arena::Arena;
use crate::error::ArenaError;

impl<'buf> Arena<'buf> {
    /// Carve an aligned slice of `len` values of `T`, building element `i`
    /// with `init(i)`.
    ///
    /// Values placed in the arena are never dropped by it; types with
    /// destructors must be drained by their owner before the buffer is
    /// reclaimed, or they leak. Zero-sized types consume no bytes.
    ///
    /// Returns `None` when the slice (plus alignment padding) does not fit.
    pub fn alloc_slice_with<T, F>(&mut self, len: usize, init: F) -> Option<&'buf mut [T]>
    where
        F: FnMut(usize) -> T,
    {
        self.try_alloc_slice_with(len, init).ok()
    }

    /// Like [`alloc_slice_with`](Self::alloc_slice_with), reporting
    /// exhaustion as an error.
    ///
    /// If `init` panics part way through, the region stays consumed and
    /// the elements already built are leaked.
    pub fn try_alloc_slice_with<T, F>(
        &mut self,
        len: usize,
        mut init: F,
    ) -> Result<&'buf mut [T], ArenaError>
    where
        F: FnMut(usize) -> T,
    {
        if size_of::<T>() == 0 {
            for i in 0..len {
                mem::forget(init(i));
            }
            let ptr = NonNull::<T>::dangling().as_ptr();
            // SAFETY: for zero-sized `T` any non-null aligned pointer is
            // valid for `len` elements, and each element was produced by
            // `init` above, so the values are inhabited.
            return Ok(unsafe { slice::from_raw_parts_mut(ptr, len) });
        }

        let Some(bytes) = len.checked_mul(size_of::<T>()) else {
            return Err(self.out_of_space(usize::MAX));
        };
        let block = self.try_alloc_aligned(bytes, align_of::<T>())?;
        let base = block.as_mut_ptr().cast::<T>();
        for i in 0..len {
            // SAFETY: `block` is exclusively borrowed for `'buf`, starts at
            // an address aligned for `T` and spans `len * size_of::<T>()`
            // bytes, so `base.add(i)` for `i < len` is in bounds and aligned.
            // The slot holds no initialised value, so `write` drops nothing.
            unsafe { base.add(i).write(init(i)) };
        }
        // SAFETY: all `len` elements were initialised by the loop above and
        // the region is not reachable through any other reference.
        Ok(unsafe { slice::from_raw_parts_mut(base, len) })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use crate::{Arena, ArenaError};

    #[test]
    fn slice_is_initialised_in_order() {
        let mut buf = [0u8; 256];
        let mut arena = Arena::new(&mut buf);
        let values = arena.alloc_slice_with(8, |i| i as u64 * 3).unwrap();
        assert_eq!(values, &[0, 3, 6, 9, 12, 15, 18, 21]);
    }

    #[test]
    fn slice_is_aligned_for_element_type() {
        let mut buf = [0u8; 256];
        let mut arena = Arena::new(&mut buf);
        arena.alloc(1).unwrap();
        let values = arena.alloc_slice_with(4, |_| 0u64).unwrap();
        assert_eq!(values.as_ptr() as usize % std::mem::align_of::<u64>(), 0);
    }

    #[test]
    fn slice_accounts_for_bytes_used() {
        let mut buf = [0u8; 256];
        let mut arena = Arena::new(&mut buf);
        let padding = arena.padding_for(std::mem::align_of::<u32>()).unwrap();
        arena.alloc_slice_with(5, |_| 0u32).unwrap();
        assert_eq!(arena.offset(), padding + 20);
    }

    #[test]
    fn slice_that_does_not_fit_fails_cleanly() {
        let mut buf = [0u8; 16];
        let mut arena = Arena::new(&mut buf);
        let calls = Cell::new(0);
        let result = arena.try_alloc_slice_with(100, |_| {
            calls.set(calls.get() + 1);
            0u64
        });
        assert!(matches!(result, Err(ArenaError::OutOfSpace { .. })));
        assert_eq!(calls.get(), 0, "init must not run when nothing was reserved");
        assert_eq!(arena.offset(), 0);
    }

    #[test]
    fn byte_size_overflow_is_out_of_space() {
        let mut buf = [0u8; 16];
        let mut arena = Arena::new(&mut buf);
        let result = arena.try_alloc_slice_with(usize::MAX, |_| 0u64);
        assert!(matches!(result, Err(ArenaError::OutOfSpace { .. })));
    }

    #[test]
    fn zero_sized_elements_consume_nothing() {
        let mut buf = [0u8; 4];
        let mut arena = Arena::new(&mut buf);
        let units = arena.alloc_slice_with(1000, |_| ()).unwrap();
        assert_eq!(units.len(), 1000);
        assert_eq!(arena.offset(), 0);
    }

    #[test]
    fn slices_from_one_arena_are_independent() {
        let mut buf = [0u8; 256];
        let mut arena = Arena::new(&mut buf);
        let a = arena.alloc_slice_with(4, |_| 1u32).unwrap();
        let b = arena.alloc_slice_with(4, |_| 2u32).unwrap();
        a[0] = 10;
        b[0] = 20;
        assert_eq!(a, &[10, 1, 1, 1]);
        assert_eq!(b, &[20, 2, 2, 2]);
    }
}
