//! # zkmeter
//!
//! Usage-based API billing settled with zero-knowledge proofs. Each API call
//! is metered per payer; once a payer's batch reaches capacity it is proven
//! and the proven total is settled against the payer's escrow.
//!
//! ## Architecture
//!
//! - **Core**: usage records, batches, configuration
//! - **Metering**: per-payer accumulation, normalization, stale batch reaping
//! - **ZKP**: usage aggregation circuit, proof generation and verification
//! - **Settlement**: coordinator and gateway verifier
//! - **Ledger**: escrow ledger client, event stream, transaction log
//! - **Monitoring**: pipeline metrics
//!
//! ## Example
//!
//! ```rust,ignore
//! use zkmeter::prelude::*;
//!
//! let coordinator = Arc::new(SettlementCoordinator::new(
//!     config, accumulator, generator, gateway, metrics,
//! ));
//! coordinator.record_usage(&payer, Decimal::new(42, 2), 20, "req-1")?;
//! coordinator.settle_payer(&payer).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod core;
pub mod error;
pub mod ledger;
pub mod metering;
pub mod monitoring;
pub mod settlement;
pub mod utils;
pub mod zkp;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        batch::{BatchSnapshot, BatchState, BatchSummary, NormalizedBatch},
        config::MeteringConfig,
        usage::{PayerId, ProviderId, UsageRecord},
    };
    pub use crate::error::{Error, Result};
    pub use crate::ledger::{EscrowLedger, LedgerClient, TransactionLog};
    pub use crate::metering::{BatchAccumulator, StaleReaper};
    pub use crate::monitoring::metrics::PipelineMetrics;
    pub use crate::settlement::{
        GatewayVerifier, SettlementCoordinator, SettlementGateway, SettlementOutcome,
        SettlementReceipt, SettlementRequest,
    };
    pub use crate::utils::crypto::{Hash, KeyPair, PublicKey, Signature};
    pub use crate::zkp::{NativeProofSystem, ProofArtifact, ProofGenerator, ProofSystem, ProofVerifier};
    pub use rust_decimal::Decimal;
    pub use std::sync::Arc;
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "zkmeter";
