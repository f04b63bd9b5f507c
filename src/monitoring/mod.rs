//! Monitoring for zkmeter.
//!
//! - **Metrics**: pipeline counters and per-payer payment statistics

pub mod metrics;

pub use metrics::*;
