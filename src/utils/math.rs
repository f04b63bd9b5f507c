//! Checked arithmetic for amounts in cents.
//!
//! Every sum that ends up in a proof or moves funds goes through these helpers
//! so that overflow surfaces as an [`Error`] instead of wrapping.

use crate::error::{Error, Result};

/// Safe addition with overflow check
pub fn safe_add(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u64, b: u64) -> Result<u64> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Sum a sequence of amounts, failing on the first overflow
pub fn checked_sum<I>(values: I) -> Result<u64>
where
    I: IntoIterator<Item = u64>,
{
    values.into_iter().try_fold(0u64, safe_add)
}

/// Integer average, zero for an empty set
pub fn average(total: u64, count: u64) -> u64 {
    if count == 0 {
        0
    } else {
        total / count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_arithmetic() {
        assert_eq!(safe_add(20, 25).unwrap(), 45);
        assert!(safe_add(u64::MAX, 1).is_err());
        assert_eq!(safe_sub(100, 88).unwrap(), 12);
        assert!(matches!(safe_sub(50, 88), Err(Error::Underflow { .. })));
    }

    #[test]
    fn test_checked_sum() {
        assert_eq!(checked_sum([20, 25, 20, 23]).unwrap(), 88);
        assert_eq!(checked_sum(Vec::<u64>::new()).unwrap(), 0);
        assert!(matches!(
            checked_sum([u64::MAX, 1]),
            Err(Error::Overflow { .. })
        ));
    }

    #[test]
    fn test_average() {
        assert_eq!(average(88, 2), 44);
        assert_eq!(average(0, 0), 0);
    }
}
