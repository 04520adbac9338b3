//! Workload drivers shared by the Tarn benchmarks.
//!
//! - [`contended_round`]: every thread alternates push and pop on one stack
//! - [`fill`] / [`drain`]: single-threaded bulk operations

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Barrier;
use std::thread;

use tarn_core::ConcurrentStack;

/// Push `0..count` onto `stack`, returning how many pushes were accepted.
pub fn fill<S: ConcurrentStack<u64>>(stack: &S, count: u64) -> u64 {
    (0..count).filter(|&v| stack.push(v).is_ok()).count() as u64
}

/// Pop until empty, returning the sum of popped values.
pub fn drain<S: ConcurrentStack<u64>>(stack: &S) -> u64 {
    let mut sum = 0u64;
    while let Some(v) = stack.pop() {
        sum = sum.wrapping_add(v);
    }
    sum
}

/// Run `threads` workers that each do `ops` push-then-pop pairs on a shared
/// stack, released together by a barrier. Returns the number of successful
/// pops.
///
/// The stack needs at least `threads` free nodes for every push to succeed.
pub fn contended_round<S: ConcurrentStack<u64>>(stack: &S, threads: usize, ops: u64) -> u64 {
    let barrier = Barrier::new(threads);
    thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    let mut popped = 0u64;
                    for i in 0..ops {
                        let _ = stack.push(((t as u64) << 32) | i);
                        if stack.pop().is_some() {
                            popped += 1;
                        }
                    }
                    popped
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(0))
            .sum()
    })
}
