//! Pipeline configuration.
//!
//! [`MeteringConfig`] carries every tunable of the metering and settlement
//! pipeline. It can be loaded from a JSON file, overridden from `ZKMETER_*`
//! environment variables, and must pass [`MeteringConfig::validate`] before use.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::utils::constants::*;

// ═══════════════════════════════════════════════════════════════════════════════
// METERING CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for the metering pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteringConfig {
    /// Entries covered by one proof (N)
    pub batch_capacity: usize,

    /// Idle time after which an under-capacity batch is dropped
    pub stale_timeout_secs: u64,

    /// Interval between stale batch sweeps
    pub reap_interval_secs: u64,

    /// Concurrent proof generation jobs
    pub prover_workers: usize,

    /// Deadline for read-only ledger calls and gateway round trips
    pub rpc_timeout_ms: u64,

    /// Deadline for the mutating ledger submission
    pub settlement_timeout_ms: u64,

    /// Start settlement automatically when a batch becomes ready
    pub auto_settle: bool,

    /// Provider credited by settlements
    pub provider_id: String,

    /// Optional JSON-lines mirror of the transaction log
    pub transaction_log_path: Option<PathBuf>,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            stale_timeout_secs: DEFAULT_STALE_TIMEOUT_SECS,
            reap_interval_secs: DEFAULT_REAP_INTERVAL_SECS,
            prover_workers: DEFAULT_PROVER_WORKERS,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            settlement_timeout_ms: DEFAULT_SETTLEMENT_TIMEOUT_MS,
            auto_settle: true,
            provider_id: "provider".into(),
            transaction_log_path: None,
        }
    }
}

impl MeteringConfig {
    /// Override the batch capacity (for testing)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity;
        self
    }

    /// Disable or enable automatic settlement
    pub fn with_auto_settle(mut self, auto_settle: bool) -> Self {
        self.auto_settle = auto_settle;
        self
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {}", path.display(), e)))?;

        serde_json::from_str(&content).map_err(|e| Error::Config(format!("parse {}: {}", path.display(), e)))
    }

    /// Save as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::Config(e.to_string()))?;
            }
        }

        std::fs::write(path, content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Defaults overridden by `ZKMETER_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env()
    }

    /// Apply `ZKMETER_*` environment overrides on top of `self`
    pub fn apply_env(mut self) -> Result<Self> {
        if let Some(v) = env_parse("ZKMETER_BATCH_CAPACITY")? {
            self.batch_capacity = v;
        }
        if let Some(v) = env_parse("ZKMETER_STALE_TIMEOUT_SECS")? {
            self.stale_timeout_secs = v;
        }
        if let Some(v) = env_parse("ZKMETER_REAP_INTERVAL_SECS")? {
            self.reap_interval_secs = v;
        }
        if let Some(v) = env_parse("ZKMETER_PROVER_WORKERS")? {
            self.prover_workers = v;
        }
        if let Some(v) = env_parse("ZKMETER_RPC_TIMEOUT_MS")? {
            self.rpc_timeout_ms = v;
        }
        if let Some(v) = env_parse("ZKMETER_SETTLEMENT_TIMEOUT_MS")? {
            self.settlement_timeout_ms = v;
        }
        if let Some(v) = env_parse("ZKMETER_AUTO_SETTLE")? {
            self.auto_settle = v;
        }
        if let Ok(provider) = std::env::var("ZKMETER_PROVIDER_ID") {
            self.provider_id = provider;
        }
        if let Ok(path) = std::env::var("ZKMETER_TRANSACTION_LOG") {
            self.transaction_log_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_capacity == 0 || self.batch_capacity > MAX_BATCH_CAPACITY {
            return Err(Error::Config(format!(
                "batch_capacity must be in 1..={}",
                MAX_BATCH_CAPACITY
            )));
        }
        if self.stale_timeout_secs == 0 {
            return Err(Error::Config("stale_timeout_secs must be greater than 0".into()));
        }
        if self.reap_interval_secs == 0 {
            return Err(Error::Config("reap_interval_secs must be greater than 0".into()));
        }
        if self.prover_workers == 0 {
            return Err(Error::Config("prover_workers must be greater than 0".into()));
        }
        if self.rpc_timeout_ms == 0 || self.settlement_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be greater than 0".into()));
        }
        if self.provider_id.trim().is_empty() {
            return Err(Error::Config("provider_id cannot be empty".into()));
        }
        Ok(())
    }

    /// Stale timeout in milliseconds
    pub fn stale_timeout_ms(&self) -> u64 {
        self.stale_timeout_secs.saturating_mul(1_000)
    }

    /// Sweep interval
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    /// Read-only call deadline
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Submission deadline
    pub fn settlement_timeout(&self) -> Duration {
        Duration::from_millis(self.settlement_timeout_ms)
    }

    /// Deadline for one gateway round trip as seen by the coordinator.
    ///
    /// Covers the gateway's three reads and its submission, plus one read of
    /// slack for the pair lock.
    pub fn gateway_deadline(&self) -> Duration {
        self.rpc_timeout() * 4 + self.settlement_timeout()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has invalid value {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}
