//! Canonical field encoding for proof inputs.
//!
//! All values entering the usage circuit are elements of the Goldilocks field
//! `p = 2^64 - 2^32 + 1`. Usage units and nonces map directly; response values
//! are scaled to a fixed number of decimal places with banker's rounding and the
//! resulting signed integer is reduced mod p.

use num_traits::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

use crate::error::{Error, Result};
use crate::utils::constants::{FIELD_MODULUS, MAX_RESPONSE_MAGNITUDE, RESPONSE_VALUE_SCALE};

/// An element of the Goldilocks field, always in canonical form (< p)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct FieldElement(u64);

impl FieldElement {
    /// Additive identity
    pub const ZERO: Self = Self(0);

    /// Multiplicative identity
    pub const ONE: Self = Self(1);

    /// Reduce an unsigned integer into the field
    pub fn from_u64(value: u64) -> Self {
        if value >= FIELD_MODULUS {
            Self(value - FIELD_MODULUS)
        } else {
            Self(value)
        }
    }

    /// Map a signed integer into the field; negatives become `p - |x|`
    pub fn from_i128(value: i128) -> Self {
        let reduced = value.rem_euclid(FIELD_MODULUS as i128);
        Self(reduced as u64)
    }

    /// Canonical encoding of a decimal response value.
    ///
    /// Fails when the scaled magnitude exceeds `(p - 1) / 2`, beyond which two
    /// distinct values could share an encoding.
    pub fn from_response_value(value: &Decimal) -> Result<Self> {
        let scale = Decimal::from(10u64.pow(RESPONSE_VALUE_SCALE));
        let scaled = value
            .round_dp_with_strategy(RESPONSE_VALUE_SCALE, RoundingStrategy::MidpointNearestEven)
            .checked_mul(scale)
            .ok_or_else(|| Error::Overflow {
                operation: format!("scale response value {}", value),
            })?;

        let integer = scaled.trunc().to_i128().ok_or_else(|| Error::Overflow {
            operation: format!("convert response value {}", value),
        })?;

        if integer.unsigned_abs() > MAX_RESPONSE_MAGNITUDE as u128 {
            return Err(Error::InvalidParameter {
                name: "response_value".into(),
                reason: format!(
                    "scaled magnitude {} exceeds field bound {}",
                    integer.unsigned_abs(),
                    MAX_RESPONSE_MAGNITUDE
                ),
            });
        }

        Ok(Self::from_i128(integer))
    }

    /// Canonical integer representative
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Little-endian encoding of the canonical representative
    pub fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl Add for FieldElement {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let sum = (self.0 as u128 + rhs.0 as u128) % FIELD_MODULUS as u128;
        Self(sum as u64)
    }
}

impl Sub for FieldElement {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        let diff = (self.0 as u128 + FIELD_MODULUS as u128 - rhs.0 as u128) % FIELD_MODULUS as u128;
        Self(diff as u64)
    }
}

impl Mul for FieldElement {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let product = (self.0 as u128 * rhs.0 as u128) % FIELD_MODULUS as u128;
        Self(product as u64)
    }
}

impl std::iter::Sum for FieldElement {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc + x)
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fp({})", self.0)
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
