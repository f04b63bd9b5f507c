//! Usage metering.
//!
//! - **Accumulator**: per-payer batches and in-flight tracking
//! - **Normalizer**: splits a ready batch into proof inputs and a leftover
//! - **Reaper**: drops idle, under-capacity batches

pub mod accumulator;
pub mod normalizer;
pub mod reaper;

pub use accumulator::{BatchAccumulator, SettlementTicket, StaleDrop};
pub use normalizer::{prepare, Normalization};
pub use reaper::StaleReaper;
