//! Test utilities for Tarn development.
//!
//! Provides multi-threaded stress harnesses that run any
//! [`ConcurrentStack`](tarn_core::ConcurrentStack) and check that every
//! accepted push is popped exactly once, plus a one-shot tracing
//! subscriber for tests that want log output.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod stress;

use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub use stress::{
    churn, churn_undrained, item_id, push_then_drain, ChurnRun, ConservationReport, StressConfig,
};

/// Install a test-friendly `tracing` subscriber once per process.
///
/// Filtering follows `RUST_LOG`; output goes through the test harness
/// capture so it only shows for failing tests.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // Another subscriber may already be installed by the test binary.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
