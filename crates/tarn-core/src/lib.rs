//! Core types and traits for the Tarn memory primitives.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the arena and the lock-free stacks: slot
//! identifiers and tagged head words, payload-returning error types,
//! and the [`ConcurrentStack`] trait.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod traits;

pub use error::{AllocationFailed, Contended, PushError};
pub use id::{SlotIndex, Tag, TaggedIndex};
pub use traits::ConcurrentStack;
