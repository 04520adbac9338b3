//! Arena-specific error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur during arena allocation.
///
/// Every variant leaves the arena untouched: a failed allocation never
/// advances the offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The request does not fit in the unused tail of the buffer.
    OutOfSpace {
        /// Number of bytes requested, including alignment padding.
        requested: usize,
        /// Bytes left in the buffer at the time of the request.
        remaining: usize,
    },
    /// The requested alignment is not a power of two.
    InvalidAlignment {
        /// The rejected alignment.
        align: usize,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfSpace {
                requested,
                remaining,
            } => {
                write!(
                    f,
                    "arena out of space: requested {requested} bytes, {remaining} bytes remaining"
                )
            }
            Self::InvalidAlignment { align } => {
                write!(f, "alignment {align} is not a power of two")
            }
        }
    }
}

impl Error for ArenaError {}
