//! Lock-free last-in-first-out stacks.
//!
//! Two node sources are provided, both implementing
//! [`ConcurrentStack`](tarn_core::ConcurrentStack):
//!
//! ```text
//! SlabStack<'a, T>
//! ├── live list  (AtomicU64: tagged top-slot index)
//! ├── free list  (AtomicU64: tagged top-slot index)
//! └── slots      Box<[Slot<T>]> or &'a [Slot<T>] carved from an Arena
//!
//! EpochStack<T>
//! └── head       crossbeam-epoch Atomic<Node<T>>, retired nodes deferred
//! ```
//!
//! # ABA and reclamation
//!
//! [`SlabStack`] never frees a slot while the stack is alive, so a
//! stale reader always reads valid memory, and every head update bumps a
//! tag packed next to the index so a stale compare-and-swap cannot
//! succeed on a recycled slot. [`EpochStack`] allocates nodes from the
//! global allocator and defers freeing popped nodes until every thread
//! that could still see them has unpinned.
//!
//! # Loom
//!
//! Atomics and cells go through an internal `sync` shim so that
//! `RUSTFLAGS="--cfg loom"` model-checks [`SlabStack`]. [`EpochStack`]
//! is compiled out under loom.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod backoff;
pub mod config;
#[cfg(not(loom))]
pub mod epoch;
pub mod error;
pub mod slab;
pub(crate) mod sync;

pub use config::{BackoffConfig, ConfigError, StackConfig};
#[cfg(not(loom))]
pub use epoch::EpochStack;
pub use error::{ChainFault, ChainReport, ListKind, StackError};
pub use slab::SlabStack;
pub use tarn_core::{AllocationFailed, ConcurrentStack, Contended, PushError};
