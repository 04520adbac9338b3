//! Concurrent push/pop workloads with conservation checking.
//!
//! Every pushed item is unique ([`item_id`] encodes the pushing thread and
//! its sequence number), so the harness can tell lost items, duplicated
//! items and items that were never pushed apart.

use std::collections::{HashMap, HashSet};
use std::sync::Barrier;
use std::thread;

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tarn_core::ConcurrentStack;
use tracing::debug;

/// Shape of a stress run.
#[derive(Clone, Debug)]
pub struct StressConfig {
    /// Worker threads. Default: 4.
    pub threads: usize,
    /// Items each worker pushes. Default: 1000.
    pub items_per_thread: usize,
    /// Base seed for per-thread operation mixes. Default: 0x7A12.
    pub seed: u64,
    /// Chance, in percent, that a worker pops after each push in
    /// [`churn`]. Default: 50.
    pub pop_percent: u32,
}

impl StressConfig {
    /// Total items pushed across all workers.
    pub fn total_items(&self) -> usize {
        self.threads * self.items_per_thread
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            items_per_thread: 1000,
            seed: 0x7A12,
            pop_percent: 50,
        }
    }
}

/// Unique payload for the `seq`-th push of worker `thread`.
pub fn item_id(thread: usize, seq: usize) -> u64 {
    ((thread as u64) << 32) | seq as u64
}

fn split_item(item: u64) -> (u64, u64) {
    (item >> 32, item & u64::from(u32::MAX))
}

/// Outcome of comparing accepted pushes with pops.
#[derive(Clone, Debug, Default)]
pub struct ConservationReport {
    /// Pushes the stack accepted.
    pub pushed: usize,
    /// Pushes rejected with `AllocationFailed`.
    pub rejected: usize,
    /// Values popped, including the final drain.
    pub popped: usize,
    /// Accepted items never popped.
    pub missing: Vec<u64>,
    /// Items popped more than once.
    pub duplicated: Vec<u64>,
    /// Popped values that were never accepted.
    pub unexpected: Vec<u64>,
    /// Drain-order inversions among one worker's items (only checked by
    /// [`push_then_drain`]).
    pub order_violations: usize,
}

impl ConservationReport {
    /// Compare the accepted pushes of a run against everything popped,
    /// including any final drain. `rejected` is carried through unchecked.
    pub fn compare(pushed: &[u64], rejected: usize, popped: &[u64]) -> Self {
        let accepted: HashSet<u64> = pushed.iter().copied().collect();
        let mut seen: HashMap<u64, usize> = HashMap::with_capacity(popped.len());
        for &v in popped {
            *seen.entry(v).or_default() += 1;
        }

        let mut missing: Vec<u64> = accepted
            .iter()
            .filter(|v| !seen.contains_key(v))
            .copied()
            .collect();
        let mut duplicated: Vec<u64> = seen
            .iter()
            .filter(|&(_, &n)| n > 1)
            .map(|(&v, _)| v)
            .collect();
        let mut unexpected: Vec<u64> = seen
            .keys()
            .filter(|v| !accepted.contains(v))
            .copied()
            .collect();
        missing.sort_unstable();
        duplicated.sort_unstable();
        unexpected.sort_unstable();

        Self {
            pushed: pushed.len(),
            rejected,
            popped: popped.len(),
            missing,
            duplicated,
            unexpected,
            order_violations: 0,
        }
    }

    /// No item lost, duplicated or invented.
    pub fn is_conserved(&self) -> bool {
        self.missing.is_empty()
            && self.duplicated.is_empty()
            && self.unexpected.is_empty()
            && self.pushed == self.popped
    }

    /// Panic with the full report unless the run conserved items and kept
    /// each worker's items in reverse push order.
    pub fn assert_ok(&self) {
        assert!(self.is_conserved(), "items not conserved: {self:?}");
        assert_eq!(self.order_violations, 0, "LIFO order violated: {self:?}");
    }
}

/// Count adjacent inversions of each worker's sequence numbers in `drained`.
///
/// After all pushes have completed, one worker's items must come out of a
/// single-threaded drain in strictly decreasing sequence order.
fn lifo_violations(drained: &[u64]) -> usize {
    let mut last_seq: HashMap<u64, u64> = HashMap::new();
    let mut violations = 0;
    for &item in drained {
        let (thread, seq) = split_item(item);
        if let Some(prev) = last_seq.insert(thread, seq) {
            if seq >= prev {
                violations += 1;
            }
        }
    }
    violations
}

/// Push `value`, counting it as rejected if the stack has no node for it.
fn push_or_reject<S: ConcurrentStack<u64>>(stack: &S, value: u64) -> bool {
    stack.push(value).is_ok()
}

/// All workers push their items concurrently, then the calling thread
/// drains the stack until empty.
///
/// Pushes that fail with `AllocationFailed` are recorded as rejected and
/// excluded from the conservation check.
pub fn push_then_drain<S: ConcurrentStack<u64>>(
    stack: &S,
    config: &StressConfig,
) -> ConservationReport {
    let barrier = Barrier::new(config.threads);
    let per_thread: Vec<(Vec<u64>, usize)> = thread::scope(|s| {
        let handles: Vec<_> = (0..config.threads)
            .map(|t| {
                let barrier = &barrier;
                s.spawn(move || {
                    let mut accepted = Vec::with_capacity(config.items_per_thread);
                    let mut rejected = 0;
                    barrier.wait();
                    for seq in 0..config.items_per_thread {
                        let item = item_id(t, seq);
                        if push_or_reject(stack, item) {
                            accepted.push(item);
                        } else {
                            rejected += 1;
                        }
                    }
                    (accepted, rejected)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("stress worker panicked"))
            .collect()
    });

    let mut drained = Vec::new();
    while let Some(v) = stack.pop() {
        drained.push(v);
    }

    let pushed: Vec<u64> = per_thread.iter().flat_map(|(a, _)| a.iter().copied()).collect();
    let rejected = per_thread.iter().map(|(_, r)| r).sum();
    let mut report = ConservationReport::compare(&pushed, rejected, &drained);
    report.order_violations = lifo_violations(&drained);
    debug!(
        threads = config.threads,
        pushed = report.pushed,
        rejected = report.rejected,
        popped = report.popped,
        "push_then_drain finished"
    );
    report
}

/// Pushes and pops made by [`churn_undrained`] workers. Whatever was
/// pushed but not popped is still on the stack.
#[derive(Clone, Debug, Default)]
pub struct ChurnRun {
    /// Every item the workers pushed (all pushes are eventually accepted).
    pub pushed: Vec<u64>,
    /// Items the workers popped.
    pub popped: Vec<u64>,
}

impl ChurnRun {
    /// Items that should still be on the stack.
    pub fn remaining(&self) -> usize {
        self.pushed.len().saturating_sub(self.popped.len())
    }

    /// Pushed items no worker popped, sorted.
    pub fn outstanding(&self) -> Vec<u64> {
        let popped: HashSet<u64> = self.popped.iter().copied().collect();
        let mut left: Vec<u64> = self
            .pushed
            .iter()
            .filter(|v| !popped.contains(v))
            .copied()
            .collect();
        left.sort_unstable();
        left
    }

    /// Drain `stack` and compare every pop against the pushes.
    pub fn finish<S: ConcurrentStack<u64>>(mut self, stack: &S) -> ConservationReport {
        while let Some(v) = stack.pop() {
            self.popped.push(v);
        }
        let report = ConservationReport::compare(&self.pushed, 0, &self.popped);
        debug!(
            pushed = report.pushed,
            popped = report.popped,
            "churn finished"
        );
        report
    }
}

/// Workers interleave pushes and pops at random, so nodes are recycled
/// while other threads still race on them. The stack is left as the
/// workers left it, for quiescent inspection before [`ChurnRun::finish`].
///
/// A worker whose push is refused pops one value (forwarding it like any
/// other pop) and retries, so every item is eventually accepted.
pub fn churn_undrained<S: ConcurrentStack<u64>>(stack: &S, config: &StressConfig) -> ChurnRun {
    let barrier = Barrier::new(config.threads);
    let (tx, rx) = crossbeam_channel::unbounded::<u64>();
    thread::scope(|s| {
        for t in 0..config.threads {
            let barrier = &barrier;
            let tx = tx.clone();
            s.spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed ^ t as u64);
                barrier.wait();
                for seq in 0..config.items_per_thread {
                    let mut item = item_id(t, seq);
                    loop {
                        match stack.push(item) {
                            Ok(()) => break,
                            Err(refused) => {
                                item = refused.into_inner();
                                if let Some(v) = stack.pop() {
                                    tx.send(v).expect("collector outlives workers");
                                } else {
                                    thread::yield_now();
                                }
                            }
                        }
                    }
                    if rng.next_u32() % 100 < config.pop_percent {
                        if let Some(v) = stack.pop() {
                            tx.send(v).expect("collector outlives workers");
                        }
                    }
                }
            });
        }
    });
    drop(tx);

    let pushed = (0..config.threads)
        .flat_map(|t| (0..config.items_per_thread).map(move |seq| item_id(t, seq)))
        .collect();
    let popped = rx.try_iter().collect();
    debug!(threads = config.threads, "churn workers done");
    ChurnRun { pushed, popped }
}

/// [`churn_undrained`] followed by a drain on the calling thread.
pub fn churn<S: ConcurrentStack<u64>>(stack: &S, config: &StressConfig) -> ConservationReport {
    churn_undrained(stack, config).finish(stack)
}
