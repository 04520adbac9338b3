//! Stack configuration and validation.

use std::error::Error;
use std::fmt;

use tarn_core::id::NIL_INDEX;

// ── BackoffConfig ──────────────────────────────────────────────────

/// Shape of the busy-wait applied after a failed compare-and-swap.
///
/// After the `n`-th consecutive failure a thread spins `2^n` times while
/// `n <= spin_limit`, then yields its time slice on every further
/// failure. Unbounded operations retry forever; the `try_*` variants
/// give up after `max_attempts` failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Largest spin exponent. Default: 6 (64 spins). Must be at most 16.
    pub spin_limit: u32,
    /// Exponent after which the step stops growing. Default: 10.
    /// Must be at least `spin_limit`.
    pub yield_limit: u32,
    /// Failed attempts after which bounded operations report contention.
    /// Default: 64. Must be at least 1.
    pub max_attempts: u32,
}

impl BackoffConfig {
    /// Default spin exponent cap.
    pub const DEFAULT_SPIN_LIMIT: u32 = 6;

    /// Default step cap.
    pub const DEFAULT_YIELD_LIMIT: u32 = 10;

    /// Default attempt budget for bounded operations.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 64;

    /// Upper bound on `spin_limit`.
    pub const MAX_SPIN_LIMIT: u32 = 16;

    /// Check the invariants documented on each field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spin_limit > Self::MAX_SPIN_LIMIT {
            return Err(ConfigError::InvalidBackoff {
                reason: format!(
                    "spin_limit {} exceeds maximum of {}",
                    self.spin_limit,
                    Self::MAX_SPIN_LIMIT
                ),
            });
        }
        if self.yield_limit < self.spin_limit {
            return Err(ConfigError::InvalidBackoff {
                reason: format!(
                    "yield_limit {} is below spin_limit {}",
                    self.yield_limit, self.spin_limit
                ),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidBackoff {
                reason: "max_attempts must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            spin_limit: Self::DEFAULT_SPIN_LIMIT,
            yield_limit: Self::DEFAULT_YIELD_LIMIT,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`StackConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A slab with no slots can never accept a push.
    ZeroCapacity,
    /// Capacity does not fit the 32-bit slot index space.
    CapacityOverflow {
        /// The configured capacity.
        value: usize,
    },
    /// BackoffConfig invariant violated.
    InvalidBackoff {
        /// Description of which invariant was violated.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCapacity => write!(f, "capacity must be at least 1"),
            Self::CapacityOverflow { value } => {
                write!(
                    f,
                    "capacity {value} exceeds maximum of {}",
                    StackConfig::MAX_CAPACITY
                )
            }
            Self::InvalidBackoff { reason } => {
                write!(f, "invalid backoff config: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

// ── StackConfig ────────────────────────────────────────────────────

/// Configuration for a [`SlabStack`](crate::SlabStack).
///
/// [`EpochStack`](crate::EpochStack) only reads `backoff`; it has no
/// fixed capacity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackConfig {
    /// Number of node slots in the slab. Default: 1024.
    /// Must be in `1..=MAX_CAPACITY`.
    pub capacity: usize,
    /// Retry behaviour under contention.
    pub backoff: BackoffConfig,
}

impl StackConfig {
    /// Default slab size.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Largest slab size. Index `u32::MAX` is reserved as the nil link.
    pub const MAX_CAPACITY: usize = NIL_INDEX as usize;

    /// A config with the given capacity and default backoff.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            backoff: BackoffConfig::default(),
        }
    }

    /// Replace the backoff settings.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Check all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.capacity > Self::MAX_CAPACITY {
            return Err(ConfigError::CapacityOverflow {
                value: self.capacity,
            });
        }
        self.backoff.validate()
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
