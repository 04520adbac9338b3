//! The stack abstraction shared by every node source.

use crate::error::AllocationFailed;

/// A last-in-first-out stack that many threads may push to and pop from
/// through a shared reference.
///
/// Implementations are lock-free: a stalled thread never prevents other
/// threads from completing their operations. Ordering is LIFO among
/// pushes that completed before a given pop read the head; racing
/// operations are ordered only by their successful compare-and-swap.
pub trait ConcurrentStack<T>: Send + Sync {
    /// Push `value` on top of the stack.
    ///
    /// Retries until the head update succeeds. Fails only when no node
    /// can be obtained for the payload, in which case the value is
    /// handed back.
    fn push(&self, value: T) -> Result<(), AllocationFailed<T>>;

    /// Detach and return the top value, or `None` if the stack is empty.
    fn pop(&self) -> Option<T>;

    /// Whether the stack held no values at the instant of the check.
    fn is_empty(&self) -> bool;
}
