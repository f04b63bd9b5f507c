//! Append-only settlement transaction log.
//!
//! The gateway records one [`LedgerTransaction`] per settled batch. Entries
//! live in memory and can be mirrored to a JSON-lines file so the history
//! survives a restart.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crate::core::usage::{PayerId, ProviderId};
use crate::error::{Error, Result};
use crate::utils::crypto::Hash;

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a settlement landed on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRef {
    /// Block number
    pub block_number: u64,
    /// Transaction hash
    pub tx_hash: Hash,
}

/// Which proof backed a settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRef {
    /// Hash of the proof bytes
    pub proof_hash: Hash,
    /// Circuit the proof was generated for
    pub circuit_id: String,
    /// Hash of the public inputs
    pub public_inputs_hash: Hash,
}

/// One settled batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Log entry id
    pub id: Hash,
    /// Batch settled
    pub batch_id: Hash,
    /// Payer debited
    pub payer: PayerId,
    /// Provider credited
    pub provider: ProviderId,
    /// Amount in cents
    pub amount: u64,
    /// Payer balance before
    pub balance_before: u64,
    /// Payer balance after
    pub balance_after: u64,
    pub ledger_ref: LedgerRef,
    pub proof_ref: ProofRef,
    /// API calls covered
    pub num_calls: u32,
    /// Recovered from the ledger rather than confirmed directly
    pub reconciled: bool,
    /// Record time (unix ms)
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Append-only log, idempotent per batch id
#[derive(Debug, Default)]
pub struct TransactionLog {
    entries: RwLock<Vec<LedgerTransaction>>,
    mirror: Option<PathBuf>,
    writer: Mutex<()>,
}

impl TransactionLog {
    /// In-memory log
    pub fn new() -> Self {
        Self::default()
    }

    /// Log mirrored to `path`, loading any entries already there
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("Failed to create log directory: {}", e))
                })?;
            }
        }

        let entries = Self::load(&path)?;
        Ok(Self {
            entries: RwLock::new(entries),
            mirror: Some(path),
            writer: Mutex::new(()),
        })
    }

    /// Read every entry from a JSON-lines file
    pub fn load(path: &Path) -> Result<Vec<LedgerTransaction>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open transaction log: {}", e)))?;

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::Storage(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let tx: LedgerTransaction = serde_json::from_str(&line)
                .map_err(|e| Error::Deserialization(format!("Bad log line: {}", e)))?;
            entries.push(tx);
        }
        Ok(entries)
    }

    /// Append a transaction. Returns false if the batch was already logged.
    pub fn append(&self, tx: LedgerTransaction) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|_| Error::Lock)?;
        if entries.iter().any(|e| e.batch_id == tx.batch_id) {
            return Ok(false);
        }

        if let Some(path) = &self.mirror {
            let _guard = self.writer.lock().map_err(|_| Error::Lock)?;
            let line = serde_json::to_string(&tx)
                .map_err(|e| Error::Serialization(e.to_string()))?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::Storage(format!("Failed to open transaction log: {}", e)))?;
            writeln!(file, "{}", line).map_err(|e| Error::Storage(e.to_string()))?;
        }

        entries.push(tx);
        Ok(true)
    }

    /// Every entry, oldest first
    pub fn all(&self) -> Vec<LedgerTransaction> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Entries of one payer
    pub fn for_payer(&self, payer: &PayerId) -> Vec<LedgerTransaction> {
        self.entries
            .read()
            .map(|e| e.iter().filter(|t| &t.payer == payer).cloned().collect())
            .unwrap_or_default()
    }

    /// Entry for a batch id
    pub fn find_by_batch(&self, batch_id: &Hash) -> Option<LedgerTransaction> {
        self.entries
            .read()
            .ok()
            .and_then(|e| e.iter().find(|t| &t.batch_id == batch_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tx(batch: &[u8], payer: &str, amount: u64) -> LedgerTransaction {
        let batch_id = Hash::sha256(batch);
        LedgerTransaction {
            id: Hash::sha256(&[batch, b"-log"].concat()),
            batch_id,
            payer: PayerId::from(payer),
            provider: ProviderId::from("api"),
            amount,
            balance_before: 1_000,
            balance_after: 1_000 - amount,
            ledger_ref: LedgerRef {
                block_number: 7,
                tx_hash: Hash::sha256(b"tx"),
            },
            proof_ref: ProofRef {
                proof_hash: Hash::sha256(b"proof"),
                circuit_id: "c".into(),
                public_inputs_hash: Hash::sha256(b"pi"),
            },
            num_calls: 4,
            reconciled: false,
            timestamp: 0,
        }
    }

    #[test]
    fn test_append_is_idempotent_per_batch() {
        let log = TransactionLog::new();
        assert!(log.append(tx(b"1", "alice", 88)).unwrap());
        assert!(!log.append(tx(b"1", "alice", 88)).unwrap());
        assert!(log.append(tx(b"2", "bob", 10)).unwrap());

        assert_eq!(log.len(), 2);
        assert_eq!(log.for_payer(&PayerId::from("alice")).len(), 1);
        assert_eq!(log.find_by_batch(&Hash::sha256(b"2")).unwrap().amount, 10);
        assert!(log.find_by_batch(&Hash::sha256(b"3")).is_none());
    }

    #[test]
    fn test_file_mirror_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("settlements.jsonl");

        {
            let log = TransactionLog::with_file(&path).unwrap();
            log.append(tx(b"1", "alice", 88)).unwrap();
            log.append(tx(b"2", "alice", 12)).unwrap();
        }

        let reopened = TransactionLog::with_file(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(!reopened.append(tx(b"1", "alice", 88)).unwrap());
        assert_eq!(TransactionLog::load(&path).unwrap().len(), 2);
    }
}
