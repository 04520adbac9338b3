//! Lock-free stack over a preallocated slab of node slots.
//!
//! The slab is split between two intrusive lists threaded through each
//! slot's `next` link: the live stack and the free list. Both heads are
//! [`TaggedIndex`] words, so a pop that read a head, stalled, and then
//! raced with a pop/push pair recycling the same slot sees a different
//! tag and retries instead of installing a stale `next`.
//!
//! Slots are never freed while the stack exists. A stale reader may see
//! an out-of-date `next` link, but always through a live atomic, and the
//! tagged compare-and-swap discards whatever it read.

use std::fmt;
use std::mem::{size_of, MaybeUninit};
use std::ops::Deref;

use tarn_arena::Arena;
use tarn_core::{
    AllocationFailed, ConcurrentStack, Contended, PushError, SlotIndex, Tag, TaggedIndex,
};
use tracing::{debug, trace, warn};

use crate::backoff::Backoff;
use crate::config::{BackoffConfig, StackConfig};
use crate::error::{ChainFault, ChainReport, ListKind, StackError};
use crate::sync::{AtomicIsize, AtomicU32, AtomicU64, Ordering, UnsafeCell};

/// One node of the slab.
///
/// `value` is initialised exactly while the slot is on the live list or
/// exclusively held by a thread between unlink and link.
struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    next: AtomicU32,
}

impl<T> Slot<T> {
    fn new(next: Option<SlotIndex>) -> Self {
        Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            next: AtomicU32::new(SlotIndex::to_raw(next)),
        }
    }
}

/// Where the slot array lives.
enum Slots<'a, T> {
    Heap(Box<[Slot<T>]>),
    Arena(&'a [Slot<T>]),
}

impl<T> Deref for Slots<'_, T> {
    type Target = [Slot<T>];

    fn deref(&self) -> &[Slot<T>] {
        match self {
            Self::Heap(slots) => slots,
            Self::Arena(slots) => slots,
        }
    }
}

/// Link of slot `i` in a freshly built free list of `capacity` slots.
fn initial_link(i: usize, capacity: usize) -> Option<SlotIndex> {
    (i + 1 < capacity).then(|| SlotIndex((i + 1) as u32))
}

fn corrupt(fault: ChainFault) -> StackError {
    warn!(%fault, "slab chain corrupt");
    StackError::CorruptChain(fault)
}

/// A lock-free LIFO stack whose nodes come from a fixed slab.
///
/// `push` obtains its node by unlinking a slot from the free list and
/// fails with [`AllocationFailed`] when the slab is exhausted; `pop`
/// returns the slot to the free list after moving the payload out. The
/// slab is either heap-allocated ([`SlabStack::new`]) or carved from an
/// [`Arena`] ([`SlabStack::in_arena`]), in which case it borrows the
/// arena's buffer for `'a`.
pub struct SlabStack<'a, T> {
    live: AtomicU64,
    free: AtomicU64,
    /// Signed so a pop that overtakes its push's increment cannot wrap.
    len: AtomicIsize,
    slots: Slots<'a, T>,
    backoff: BackoffConfig,
}

// SAFETY: payloads move between threads through push/pop but are never
// shared: a slot's value is touched only by the thread that unlinked it.
// Shared references to payloads are only produced through `&mut self`.
unsafe impl<T: Send> Send for SlabStack<'_, T> {}
// SAFETY: see above; all cross-thread coordination goes through atomics.
unsafe impl<T: Send> Sync for SlabStack<'_, T> {}

// Compile-time assertion: SlabStack must be Send + Sync for Send payloads.
#[cfg(not(loom))]
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<SlabStack<'static, std::cell::Cell<u64>>>();
};

impl<T> SlabStack<'static, T> {
    /// Build a stack with a heap-allocated slab.
    ///
    /// The slab is reserved fallibly: if the global allocator refuses it,
    /// this returns [`StackError::AllocationFailed`] instead of aborting.
    pub fn new(config: StackConfig) -> Result<Self, StackError> {
        config.validate()?;
        let capacity = config.capacity;
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| StackError::AllocationFailed {
                slots: capacity,
                bytes: capacity.saturating_mul(size_of::<Slot<T>>()),
            })?;
        slots.extend((0..capacity).map(|i| Slot::new(initial_link(i, capacity))));
        debug!(capacity, storage = "heap", "slab stack created");
        Ok(Self::from_slots(
            Slots::Heap(slots.into_boxed_slice()),
            config.backoff,
        ))
    }

    /// Build a heap-backed stack with `capacity` slots and default backoff.
    pub fn with_capacity(capacity: usize) -> Result<Self, StackError> {
        Self::new(StackConfig::new(capacity))
    }
}

impl<'a, T> SlabStack<'a, T> {
    /// Build a stack whose slab is carved from `arena`.
    ///
    /// The slots stay in the arena's buffer for `'a`. Payloads still in
    /// the stack are dropped when the stack is dropped; the slots
    /// themselves need no cleanup.
    pub fn in_arena(arena: &mut Arena<'a>, config: StackConfig) -> Result<Self, StackError> {
        config.validate()?;
        let capacity = config.capacity;
        let slots =
            arena.try_alloc_slice_with(capacity, |i| Slot::new(initial_link(i, capacity)))?;
        debug!(
            capacity,
            storage = "arena",
            arena_offset = arena.offset(),
            "slab stack created"
        );
        Ok(Self::from_slots(Slots::Arena(slots), config.backoff))
    }

    fn from_slots(slots: Slots<'a, T>, backoff: BackoffConfig) -> Self {
        // Validated capacity is at least one, so slot 0 heads the free list.
        let free = TaggedIndex::new(Some(SlotIndex(0)), Tag(0));
        Self {
            live: AtomicU64::new(TaggedIndex::EMPTY.pack()),
            free: AtomicU64::new(free.pack()),
            len: AtomicIsize::new(0),
            slots,
            backoff,
        }
    }

    /// Push `value` on top of the stack, retrying until it is linked.
    ///
    /// Fails only when every slot is in use; the value is handed back.
    pub fn push(&self, value: T) -> Result<(), AllocationFailed<T>> {
        self.push_inner(value, false)
            .map_err(|e| AllocationFailed(e.into_inner()))
    }

    /// Push with a bounded retry budget (`BackoffConfig::max_attempts`).
    ///
    /// The budget applies separately to taking a slot from the free list
    /// and to linking it into the stack. On contention the value is
    /// handed back and the slot returned to the free list.
    pub fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        self.push_inner(value, true)
    }

    /// Detach and return the top value, or `None` if the stack is empty.
    pub fn pop(&self) -> Option<T> {
        self.pop_inner(false).ok().flatten()
    }

    /// Pop with a bounded retry budget (`BackoffConfig::max_attempts`).
    ///
    /// Once a value has been detached, returning its slot to the free
    /// list is not bounded.
    pub fn try_pop(&self) -> Result<Option<T>, Contended> {
        self.pop_inner(true)
    }

    /// Whether the stack held no values at the instant of the check.
    pub fn is_empty(&self) -> bool {
        TaggedIndex::unpack(self.live.load(Ordering::Acquire)).is_nil()
    }

    /// Number of values on the stack.
    ///
    /// Exact when quiescent; approximate while other threads push or pop.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed).max(0) as usize
    }

    /// Number of slots in the slab.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Walk both lists and check that they partition the slab.
    ///
    /// Requires `&mut self`, so no other thread can be mid-operation.
    pub fn validate(&mut self) -> Result<ChainReport, StackError> {
        let capacity = self.slots.len();
        let mut owner: Vec<Option<ListKind>> = vec![None; capacity];
        let mut report = ChainReport { live: 0, free: 0 };

        for (list, head) in [(ListKind::Live, &self.live), (ListKind::Free, &self.free)] {
            let mut cursor = TaggedIndex::unpack(head.load(Ordering::Acquire)).index;
            let mut count = 0usize;
            while let Some(index) = cursor {
                let i = index.as_usize();
                if i >= capacity {
                    return Err(corrupt(ChainFault::IndexOutOfRange { list, index }));
                }
                match owner[i] {
                    Some(seen) if seen == list => {
                        return Err(corrupt(ChainFault::Cycle { list, index }));
                    }
                    Some(_) => return Err(corrupt(ChainFault::SharedSlot { index })),
                    None => owner[i] = Some(list),
                }
                count += 1;
                cursor = SlotIndex::from_raw(self.slots[i].next.load(Ordering::Relaxed));
            }
            match list {
                ListKind::Live => report.live = count,
                ListKind::Free => report.free = count,
            }
        }

        let leaked = capacity - report.live - report.free;
        if leaked > 0 {
            return Err(corrupt(ChainFault::Leaked { count: leaked }));
        }
        Ok(report)
    }

    /// The values on the stack, top first.
    ///
    /// Requires `&mut self`, so the chain cannot change underneath.
    pub fn contents(&mut self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.len());
        let mut cursor = TaggedIndex::unpack(self.live.load(Ordering::Acquire)).index;
        while let Some(index) = cursor {
            let slot = self.slot(index);
            // SAFETY: slots on the live list hold initialised payloads, and
            // `&mut self` keeps every other thread from popping them while
            // the returned references live.
            out.push(slot.value.with(|p| unsafe { (*p).assume_init_ref() }));
            cursor = SlotIndex::from_raw(slot.next.load(Ordering::Relaxed));
            if out.len() > self.slots.len() {
                break;
            }
        }
        out
    }

    fn slot(&self, index: SlotIndex) -> &Slot<T> {
        &self.slots[index.as_usize()]
    }

    fn push_inner(&self, value: T, bounded: bool) -> Result<(), PushError<T>> {
        let index = match self.unlink(&self.free, bounded) {
            Ok(Some(index)) => index,
            Ok(None) => {
                trace!(capacity = self.capacity(), "slab exhausted");
                return Err(PushError::AllocationFailed(value));
            }
            Err(_) => return Err(PushError::Contended(value)),
        };
        let slot = self.slot(index);
        // SAFETY: `index` was just unlinked from the free list, so no other
        // thread can reach this slot's payload until it is linked below.
        slot.value.with_mut(|p| unsafe {
            (*p).write(value);
        });
        match self.link(&self.live, index, bounded) {
            Ok(()) => {
                self.len.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => {
                // SAFETY: the slot never became reachable from the live list
                // and its payload was initialised above.
                let value = slot.value.with(|p| unsafe { (*p).assume_init_read() });
                self.release(index);
                Err(PushError::Contended(value))
            }
        }
    }

    fn pop_inner(&self, bounded: bool) -> Result<Option<T>, Contended> {
        let Some(index) = self.unlink(&self.live, bounded)? else {
            return Ok(None);
        };
        self.len.fetch_sub(1, Ordering::Relaxed);
        // SAFETY: the successful unlink made this thread the slot's only
        // owner, and the push that linked it initialised the payload.
        let value = self
            .slot(index)
            .value
            .with(|p| unsafe { (*p).assume_init_read() });
        self.release(index);
        Ok(Some(value))
    }

    /// Return a slot whose payload has been moved out to the free list.
    fn release(&self, index: SlotIndex) {
        let linked = self.link(&self.free, index, false);
        debug_assert!(linked.is_ok(), "unbounded link cannot give up");
    }

    /// Detach the top slot of `list`.
    fn unlink(&self, list: &AtomicU64, bounded: bool) -> Result<Option<SlotIndex>, Contended> {
        let mut backoff = Backoff::new(&self.backoff);
        let mut current = TaggedIndex::unpack(list.load(Ordering::Acquire));
        loop {
            let Some(index) = current.index else {
                return Ok(None);
            };
            // May be stale if `index` was recycled since `current` was read;
            // the tag then no longer matches and the exchange fails.
            let next = SlotIndex::from_raw(self.slot(index).next.load(Ordering::Relaxed));
            match list.compare_exchange_weak(
                current.pack(),
                current.successor(next).pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(Some(index)),
                Err(actual) => {
                    backoff.snooze();
                    if bounded && backoff.is_exhausted() {
                        return Err(Contended {
                            attempts: backoff.failures(),
                        });
                    }
                    current = TaggedIndex::unpack(actual);
                }
            }
        }
    }

    /// Make the exclusively held slot `index` the new top of `list`.
    fn link(&self, list: &AtomicU64, index: SlotIndex, bounded: bool) -> Result<(), Contended> {
        let slot = self.slot(index);
        let mut backoff = Backoff::new(&self.backoff);
        let mut current = TaggedIndex::unpack(list.load(Ordering::Relaxed));
        loop {
            slot.next
                .store(SlotIndex::to_raw(current.index), Ordering::Relaxed);
            match list.compare_exchange_weak(
                current.pack(),
                current.successor(Some(index)).pack(),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => {
                    backoff.snooze();
                    if bounded && backoff.is_exhausted() {
                        return Err(Contended {
                            attempts: backoff.failures(),
                        });
                    }
                    current = TaggedIndex::unpack(actual);
                }
            }
        }
    }
}

impl<T> Drop for SlabStack<'_, T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

impl<T> fmt::Debug for SlabStack<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = match self.slots {
            Slots::Heap(_) => "heap",
            Slots::Arena(_) => "arena",
        };
        f.debug_struct("SlabStack")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("storage", &storage)
            .finish()
    }
}

impl<T: Send> ConcurrentStack<T> for SlabStack<'_, T> {
    fn push(&self, value: T) -> Result<(), AllocationFailed<T>> {
        SlabStack::push(self, value)
    }

    fn pop(&self) -> Option<T> {
        SlabStack::pop(self)
    }

    fn is_empty(&self) -> bool {
        SlabStack::is_empty(self)
    }
}
