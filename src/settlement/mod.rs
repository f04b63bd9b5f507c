//! Settlement pipeline.
//!
//! - **Request**: a proof plus the batch summary it covers, optionally signed
//! - **Gateway**: verifies proofs and settles them on the ledger
//! - **Coordinator**: drives ready batches from proving to settlement

pub mod coordinator;
pub mod gateway;
pub mod request;

pub use coordinator::{SettlementCoordinator, SettlementOutcome};
pub use gateway::{GatewayVerifier, SettlementGateway, SettlementReceipt};
pub use request::SettlementRequest;
