//! Treiber stack over the global allocator with epoch-based reclamation.
//!
//! Each push boxes a node. A popped node is retired through
//! `crossbeam-epoch` rather than freed on the spot, so a thread that read
//! the old head before the pop can still dereference it safely; the node
//! is released once every thread pinned at that time has unpinned. An
//! address can therefore not be reused while a stale reader holds it,
//! which rules out ABA on the head pointer.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr;

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use tarn_core::{AllocationFailed, ConcurrentStack, Contended, PushError};

use crate::backoff::Backoff;
use crate::config::{BackoffConfig, ConfigError};
use crate::sync::{AtomicIsize, Ordering};

struct Node<T> {
    /// Moved out by the popper; the node itself is freed later.
    value: ManuallyDrop<T>,
    next: Atomic<Node<T>>,
}

/// A lock-free LIFO stack with heap nodes and deferred reclamation.
///
/// Push never reports failure: node allocation goes through the global
/// allocator, whose exhaustion aborts the process.
pub struct EpochStack<T> {
    head: Atomic<Node<T>>,
    len: AtomicIsize,
    backoff: BackoffConfig,
}

// SAFETY: payloads are moved in by push and out by pop, never shared;
// shared references to them are only produced through `&mut self`.
unsafe impl<T: Send> Send for EpochStack<T> {}
// SAFETY: see above; the head is only touched through atomic operations.
unsafe impl<T: Send> Sync for EpochStack<T> {}

// Compile-time assertion: EpochStack must be Send + Sync for Send payloads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<EpochStack<std::cell::Cell<u64>>>();
};

impl<T> EpochStack<T> {
    /// Create an empty stack with default backoff.
    pub fn new() -> Self {
        Self::from_backoff(BackoffConfig::default())
    }

    /// Create an empty stack with the given backoff.
    ///
    /// Returns [`ConfigError::InvalidBackoff`] if `backoff` fails
    /// [`BackoffConfig::validate`].
    pub fn with_backoff(backoff: BackoffConfig) -> Result<Self, ConfigError> {
        backoff.validate()?;
        Ok(Self::from_backoff(backoff))
    }

    fn from_backoff(backoff: BackoffConfig) -> Self {
        Self {
            head: Atomic::null(),
            len: AtomicIsize::new(0),
            backoff,
        }
    }

    /// Push `value` on top of the stack, retrying until it is linked.
    pub fn push(&self, value: T) {
        let pushed = self.push_inner(value, false);
        debug_assert!(pushed.is_ok(), "unbounded push cannot give up");
    }

    /// Push with a bounded retry budget (`BackoffConfig::max_attempts`).
    pub fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        self.push_inner(value, true)
    }

    /// Detach and return the top value, or `None` if the stack is empty.
    pub fn pop(&self) -> Option<T> {
        self.pop_inner(false).ok().flatten()
    }

    /// Pop with a bounded retry budget (`BackoffConfig::max_attempts`).
    pub fn try_pop(&self) -> Result<Option<T>, Contended> {
        self.pop_inner(true)
    }

    /// Whether the stack held no values at the instant of the check.
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }

    /// Number of values on the stack.
    ///
    /// Exact when quiescent; approximate while other threads push or pop.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed).max(0) as usize
    }

    /// The values on the stack, top first.
    ///
    /// Requires `&mut self`, so no other thread can pop them meanwhile.
    pub fn contents(&mut self) -> Vec<&T> {
        let guard = epoch::pin();
        let mut out = Vec::new();
        let mut current = self.head.load(Ordering::Acquire, &guard);
        // SAFETY: with `&mut self` held no node can be popped and retired,
        // so every node reachable from the head stays allocated for the
        // lifetime of the returned references.
        while let Some(node) = unsafe { current.as_ref() } {
            let value: &T = &node.value;
            // SAFETY: as above; the reference outlives the guard only because
            // the node cannot be retired while `self` is mutably borrowed.
            out.push(unsafe { &*(value as *const T) });
            current = node.next.load(Ordering::Acquire, &guard);
        }
        out
    }

    fn push_inner(&self, value: T, bounded: bool) -> Result<(), PushError<T>> {
        let mut node = Owned::new(Node {
            value: ManuallyDrop::new(value),
            next: Atomic::null(),
        });
        let mut backoff = Backoff::new(&self.backoff);
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Relaxed, &guard);
            node.next.store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange(head, node, Ordering::Release, Ordering::Relaxed, &guard)
            {
                Ok(_) => {
                    self.len.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(e) => {
                    node = e.new;
                    backoff.snooze();
                    if bounded && backoff.is_exhausted() {
                        let node = *node.into_box();
                        return Err(PushError::Contended(ManuallyDrop::into_inner(node.value)));
                    }
                }
            }
        }
    }

    fn pop_inner(&self, bounded: bool) -> Result<Option<T>, Contended> {
        let mut backoff = Backoff::new(&self.backoff);
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            // SAFETY: the guard keeps any node loaded under it from being
            // freed, even if another thread pops and retires it meanwhile.
            let Some(node) = (unsafe { head.as_ref() }) else {
                return Ok(None);
            };
            let next = node.next.load(Ordering::Relaxed, &guard);
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire, &guard)
                .is_ok()
            {
                self.len.fetch_sub(1, Ordering::Relaxed);
                // SAFETY: the exchange unlinked `head`, so this thread is the
                // only one that will move its value out. The node is retired
                // rather than freed; concurrent readers may still look at
                // `next` but never at `value`.
                unsafe {
                    let value = ManuallyDrop::into_inner(ptr::read(&node.value));
                    guard.defer_destroy(head);
                    return Ok(Some(value));
                }
            }
            backoff.snooze();
            if bounded && backoff.is_exhausted() {
                return Err(Contended {
                    attempts: backoff.failures(),
                });
            }
        }
    }
}

impl<T> Default for EpochStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for EpochStack<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

impl<T> fmt::Debug for EpochStack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpochStack")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T: Send> ConcurrentStack<T> for EpochStack<T> {
    fn push(&self, value: T) -> Result<(), AllocationFailed<T>> {
        EpochStack::push(self, value);
        Ok(())
    }

    fn pop(&self) -> Option<T> {
        EpochStack::pop(self)
    }

    fn is_empty(&self) -> bool {
        EpochStack::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn pops_in_reverse_push_order() {
        let stack = EpochStack::new();
        for v in [1, 2, 3] {
            stack.push(v);
        }
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn empty_stack_reports_empty() {
        let stack: EpochStack<u8> = EpochStack::default();
        assert!(stack.is_empty());
        assert_eq!(stack.len(), 0);
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn len_tracks_quiescent_size() {
        let stack = EpochStack::new();
        stack.push('a');
        stack.push('b');
        assert_eq!(stack.len(), 2);
        stack.pop();
        assert_eq!(stack.len(), 1);
        assert!(!stack.is_empty());
    }

    #[test]
    fn contents_lists_top_first() {
        let mut stack = EpochStack::new();
        for v in ["x", "y", "z"] {
            stack.push(v.to_string());
        }
        let contents: Vec<&str> = stack.contents().into_iter().map(String::as_str).collect();
        assert_eq!(contents, vec!["z", "y", "x"]);
    }

    #[test]
    fn drop_releases_remaining_payloads() {
        let payload = Arc::new(());
        {
            let stack = EpochStack::new();
            stack.push(Arc::clone(&payload));
            stack.push(Arc::clone(&payload));
        }
        assert_eq!(Arc::strong_count(&payload), 1);
    }

    #[test]
    fn popped_value_is_not_dropped_twice() {
        let payload = Arc::new(());
        let stack = EpochStack::new();
        stack.push(Arc::clone(&payload));
        let popped = stack.pop().unwrap();
        drop(stack);
        // Flush deferred destruction so retired nodes are freed.
        for _ in 0..128 {
            epoch::pin().flush();
        }
        assert_eq!(Arc::strong_count(&payload), 2);
        drop(popped);
        assert_eq!(Arc::strong_count(&payload), 1);
    }

    #[test]
    fn bounded_ops_succeed_without_contention() {
        let stack = EpochStack::new();
        stack.try_push(5).unwrap();
        assert_eq!(stack.try_pop(), Ok(Some(5)));
        assert_eq!(stack.try_pop(), Ok(None));
    }

    #[test]
    fn with_backoff_rejects_invalid_config() {
        let backoff = BackoffConfig {
            spin_limit: 40,
            yield_limit: 40,
            ..BackoffConfig::default()
        };
        let err = EpochStack::<u8>::with_backoff(backoff).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBackoff { .. }));
    }

    #[test]
    fn with_backoff_accepts_valid_config() {
        let backoff = BackoffConfig {
            max_attempts: 1,
            ..BackoffConfig::default()
        };
        let stack = EpochStack::with_backoff(backoff).unwrap();
        stack.try_push(3u8).unwrap();
        assert_eq!(stack.try_pop(), Ok(Some(3)));
    }

    #[test]
    fn trait_push_never_fails() {
        let stack = EpochStack::new();
        assert!(ConcurrentStack::push(&stack, 1u32).is_ok());
        assert_eq!(ConcurrentStack::pop(&stack), Some(1));
    }
}
