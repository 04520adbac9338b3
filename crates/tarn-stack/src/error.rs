//! Stack construction and validation errors.

use std::error::Error;
use std::fmt;

use tarn_arena::ArenaError;
use tarn_core::SlotIndex;

use crate::config::ConfigError;

/// Errors from building or inspecting a stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StackError {
    /// The supplied configuration is invalid.
    Config(ConfigError),
    /// The arena could not hold the node slab.
    Arena(ArenaError),
    /// The global allocator refused the node slab.
    AllocationFailed {
        /// Slots requested.
        slots: usize,
        /// Bytes requested.
        bytes: usize,
    },
    /// A quiescent walk found the node chains inconsistent.
    CorruptChain(ChainFault),
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Arena(e) => write!(f, "arena: {e}"),
            Self::AllocationFailed { slots, bytes } => {
                write!(f, "node slab allocation failed: {slots} slots ({bytes} bytes)")
            }
            Self::CorruptChain(fault) => write!(f, "corrupt chain: {fault}"),
        }
    }
}

impl Error for StackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for StackError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ArenaError> for StackError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}

/// Which of the two slab lists a fault was found on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// Slots holding pushed payloads.
    Live,
    /// Slots available to the next push.
    Free,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Free => write!(f, "free"),
        }
    }
}

/// A structural defect in the slab's linked lists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainFault {
    /// A link points past the end of the slab.
    IndexOutOfRange {
        /// List the link was followed on.
        list: ListKind,
        /// The offending index.
        index: SlotIndex,
    },
    /// A list revisits a slot.
    Cycle {
        /// List containing the cycle.
        list: ListKind,
        /// First slot seen twice.
        index: SlotIndex,
    },
    /// A slot is reachable from both lists.
    SharedSlot {
        /// The shared slot.
        index: SlotIndex,
    },
    /// Slots reachable from neither list.
    Leaked {
        /// How many slots went missing.
        count: usize,
    },
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfRange { list, index } => {
                write!(f, "{list} list links to out-of-range slot {index}")
            }
            Self::Cycle { list, index } => {
                write!(f, "{list} list revisits slot {index}")
            }
            Self::SharedSlot { index } => {
                write!(f, "slot {index} is on both lists")
            }
            Self::Leaked { count } => {
                write!(f, "{count} slots are on neither list")
            }
        }
    }
}

/// Result of a successful quiescent walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainReport {
    /// Slots on the live list.
    pub live: usize,
    /// Slots on the free list.
    pub free: usize,
}
