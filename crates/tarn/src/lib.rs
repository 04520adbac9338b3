//! Tarn: bump arenas and lock-free stacks that are safe from ABA.
//!
//! This is the facade crate re-exporting the public API of the Tarn
//! sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use tarn::prelude::*;
//!
//! let mut buffer = vec![0u8; 4096];
//! let mut arena = Arena::new(&mut buffer);
//!
//! // Raw regions and typed storage come from the same buffer.
//! let header = arena.alloc(16).unwrap();
//! header.fill(0xAB);
//! let stack = SlabStack::in_arena(&mut arena, StackConfig::new(64)).unwrap();
//!
//! std::thread::scope(|s| {
//!     for t in 0..4u32 {
//!         let stack = &stack;
//!         s.spawn(move || {
//!             for i in 0..8 {
//!                 stack.push(t * 100 + i).unwrap();
//!             }
//!         });
//!     }
//! });
//! assert_eq!(stack.len(), 32);
//!
//! let mut popped = 0;
//! while stack.pop().is_some() {
//!     popped += 1;
//! }
//! assert_eq!(popped, 32);
//! assert!(stack.is_empty());
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `tarn-arena` | `Arena` bump allocator over borrowed buffers |
//! | [`types`] | `tarn-core` | Slot indices, tagged heads, payload errors, `ConcurrentStack` |
//! | [`stack`] | `tarn-stack` | `SlabStack`, `EpochStack`, configuration |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Bump allocation (`tarn-arena`).
pub use tarn_arena as arena;

/// Shared identifiers, errors and traits (`tarn-core`).
///
/// [`types::TaggedIndex`] is the packed head word the slab stack swaps;
/// [`types::ConcurrentStack`] abstracts over both stack flavours.
pub use tarn_core as types;

/// Lock-free stacks (`tarn-stack`).
///
/// [`stack::SlabStack`] draws nodes from a fixed slab and reports
/// exhaustion; [`stack::EpochStack`] allocates per push and reclaims
/// through epochs.
pub use tarn_stack as stack;

/// Common imports for typical Tarn usage.
///
/// ```rust
/// use tarn::prelude::*;
/// ```
pub mod prelude {
    // Arena
    pub use tarn_arena::{Arena, ArenaError};

    // Core vocabulary
    pub use tarn_core::{AllocationFailed, ConcurrentStack, Contended, PushError};

    // Stacks
    #[cfg(not(loom))]
    pub use tarn_stack::EpochStack;
    pub use tarn_stack::{BackoffConfig, ConfigError, SlabStack, StackConfig, StackError};
}
