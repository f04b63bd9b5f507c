//! Input validation for usage events.
//!
//! Events are validated before anything is appended to a batch, so a rejected
//! event never changes accumulator state.

use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::zkp::field::FieldElement;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIER VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate a payer, provider or request identifier
pub fn validate_id(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidUsage {
            field: field.into(),
            reason: "must not be empty".into(),
        });
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(Error::InvalidUsage {
            field: field.into(),
            reason: format!("longer than {} bytes", MAX_ID_LENGTH),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate the per-call cost in cents
pub fn validate_usage_units(usage_units: u64) -> Result<()> {
    if usage_units == 0 {
        return Err(Error::InvalidUsage {
            field: "usage_units".into(),
            reason: "must be positive".into(),
        });
    }
    if usage_units > MAX_USAGE_UNITS {
        return Err(Error::InvalidUsage {
            field: "usage_units".into(),
            reason: format!("{} exceeds maximum {}", usage_units, MAX_USAGE_UNITS),
        });
    }
    Ok(())
}

/// Validate that a response value has a canonical field encoding
pub fn validate_response_value(value: &Decimal) -> Result<()> {
    FieldElement::from_response_value(value)
        .map(|_| ())
        .map_err(|e| Error::InvalidUsage {
            field: "response_value".into(),
            reason: e.to_string(),
        })
}

/// Validate every field of a usage event
pub fn validate_usage_event(
    payer: &str,
    request_id: &str,
    response_value: &Decimal,
    usage_units: u64,
) -> Result<()> {
    validate_id(payer, "payer")?;
    validate_id(request_id, "request_id")?;
    validate_usage_units(usage_units)?;
    validate_response_value(response_value)
}
