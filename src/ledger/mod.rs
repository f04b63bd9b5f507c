//! Ledger access.
//!
//! - **Client**: the async interface the gateway settles through
//! - **Escrow**: in-process escrow ledger implementing the client
//! - **Events**: escrow event stream
//! - **Transaction log**: append-only record of settled batches

pub mod client;
pub mod escrow;
pub mod events;
pub mod transaction_log;

pub use client::{LedgerClient, LedgerReceipt, SettlementCall, SimulationOutcome};
pub use escrow::EscrowLedger;
pub use events::{EscrowEvent, EscrowEventRecord};
pub use transaction_log::{LedgerRef, LedgerTransaction, ProofRef, TransactionLog};
