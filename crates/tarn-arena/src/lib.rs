//! Bump allocation over caller-supplied buffers.
//!
//! An [`Arena`] holds an exclusive borrow of a byte buffer owned by the
//! caller and carves non-overlapping regions off its front. There is no
//! per-allocation free: the whole buffer is reclaimed at once when the
//! arena and every region it handed out go out of scope, after which a
//! fresh arena can be built over the same buffer.
//!
//! ```text
//! buffer: [ returned | returned | pad | returned |      remaining      ]
//!         0                                      ^offset        capacity
//! ```
//!
//! # Alignment
//!
//! [`Arena::alloc`] never aligns. Callers that need aligned storage use
//! [`Arena::alloc_aligned`] or the typed [`Arena::alloc_slice_with`],
//! which pad explicitly and report the padding in [`Arena::offset`].
//!
//! # Threading
//!
//! Every allocating method takes `&mut self`. Sharing an arena between
//! threads needs external locking; one arena per thread is the usual
//! arrangement.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod arena;
pub mod error;
mod raw;

pub use arena::Arena;
pub use error::ArenaError;
