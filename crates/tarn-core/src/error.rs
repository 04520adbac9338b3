//! Error types shared by every stack implementation.
//!
//! Push failures hand the rejected value back to the caller so nothing
//! the caller owned is lost on the error path.

use std::error::Error;
use std::fmt;

/// A push could not obtain a node for its payload.
///
/// For slab-backed stacks this means every slot is in use. The payload
/// is returned unchanged; recover it with [`into_inner`](Self::into_inner).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AllocationFailed<T>(pub T);

impl<T> AllocationFailed<T> {
    /// Take back the value that could not be pushed.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for AllocationFailed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationFailed").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for AllocationFailed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node allocation failed: no free slot for payload")
    }
}

impl<T> Error for AllocationFailed<T> {}

/// Errors from a bounded-retry push.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PushError<T> {
    /// No node was available for the payload.
    AllocationFailed(T),
    /// The retry budget ran out before the compare-and-swap succeeded.
    Contended(T),
}

impl<T> PushError<T> {
    /// Take back the value that could not be pushed.
    pub fn into_inner(self) -> T {
        match self {
            Self::AllocationFailed(v) | Self::Contended(v) => v,
        }
    }

    /// Whether the failure was contention rather than exhaustion.
    pub fn is_contended(&self) -> bool {
        matches!(self, Self::Contended(_))
    }
}

impl<T> From<AllocationFailed<T>> for PushError<T> {
    fn from(e: AllocationFailed<T>) -> Self {
        Self::AllocationFailed(e.0)
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed(_) => f.write_str("AllocationFailed(..)"),
            Self::Contended(_) => f.write_str("Contended(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed(_) => write!(f, "node allocation failed"),
            Self::Contended(_) => write!(f, "push gave up under contention"),
        }
    }
}

impl<T> Error for PushError<T> {}

/// A bounded-retry operation exhausted its attempt budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Contended {
    /// Number of failed compare-and-swap attempts.
    pub attempts: u32,
}

impl fmt::Display for Contended {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} contended attempts", self.attempts)
    }
}

impl Error for Contended {}
