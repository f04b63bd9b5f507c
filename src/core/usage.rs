//! Usage records and party identifiers.
//!
//! A [`UsageRecord`] is one metered API call billed to a payer. Records are
//! immutable once created; batches only ever append, split or drop them.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Identity of the account billed for usage
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayerId(String);

/// Identity of the API provider receiving payment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl PayerId {
    /// Create a payer id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ProviderId {
    /// Create a provider id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PayerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// USAGE RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// One metered call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Payer billed for the call
    pub payer: PayerId,
    /// Value returned to the caller, bound into the proof commitment
    pub response_value: Decimal,
    /// Cost of the call in cents
    pub usage_units: u64,
    /// Unique request id
    pub request_id: String,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

impl UsageRecord {
    /// Create a record stamped at `timestamp`
    pub fn new(
        payer: PayerId,
        response_value: Decimal,
        usage_units: u64,
        request_id: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            payer,
            response_value,
            usage_units,
            request_id: request_id.into(),
            timestamp,
        }
    }
}

/// Current wall-clock time in unix milliseconds
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_transparently() {
        let payer = PayerId::from("0xpayer");
        assert_eq!(serde_json::to_string(&payer).unwrap(), "\"0xpayer\"");
        assert_eq!(payer.to_string(), "0xpayer");
    }

    #[test]
    fn test_now_millis_is_recent() {
        // 2020-01-01 in millis
        assert!(now_millis() > 1_577_836_800_000);
    }
}
