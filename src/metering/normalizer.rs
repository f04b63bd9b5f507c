//! Batch normalization.
//!
//! Splits a ready batch into exactly `capacity` entries for proving and a
//! leftover batch carrying the remainder under a fresh nonce.

use crate::core::batch::{Batch, NormalizedBatch};
use crate::error::{Error, Result};
use crate::utils::math::checked_sum;

/// Output of [`prepare`]
#[derive(Debug, Clone)]
pub struct Normalization {
    /// The first `capacity` entries, ready for proving
    pub normalized: NormalizedBatch,
    /// Remaining entries, if any, as a new open batch
    pub leftover: Option<Batch>,
}

/// Normalize a ready batch.
///
/// Takes the first `capacity` entries in insertion order and recomputes the
/// claimed total from them. Entries beyond capacity move to a new batch with a
/// fresh nonce stamped at `now`. Fails with [`Error::BatchNotReady`] when the
/// batch is under capacity.
pub fn prepare(batch: Batch, now: u64) -> Result<Normalization> {
    if batch.capacity == 0 || batch.entries.len() < batch.capacity {
        return Err(Error::BatchNotReady {
            entries: batch.entries.len(),
            capacity: batch.capacity,
        });
    }

    let Batch {
        id,
        payer,
        mut entries,
        capacity,
        nonce,
        ..
    } = batch;

    let rest = entries.split_off(capacity);
    let claimed_total = checked_sum(entries.iter().map(|e| e.usage_units))?;
    let request_ids = entries.iter().map(|e| e.request_id.clone()).collect();

    let leftover = if rest.is_empty() {
        None
    } else {
        Some(Batch::with_entries(payer.clone(), capacity, rest, now))
    };

    Ok(Normalization {
        normalized: NormalizedBatch {
            batch_id: id,
            payer,
            entries,
            claimed_total,
            request_ids,
            nonce,
            normalized_at: now,
        },
        leftover,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::usage::{PayerId, UsageRecord};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn batch_with(units: &[u64], capacity: usize) -> Batch {
        let payer = PayerId::from("payer");
        let mut batch = Batch::new(payer.clone(), capacity, 100);
        for (i, u) in units.iter().enumerate() {
            batch.push(UsageRecord::new(payer.clone(), Decimal::ONE, *u, format!("r{}", i), 100), 100 + i as u64);
        }
        batch
    }

    #[test]
    fn test_exact_capacity() {
        let batch = batch_with(&[20, 25, 20, 23], 4);
        let id = batch.id;
        let result = prepare(batch, 500).unwrap();

        assert_eq!(result.normalized.claimed_total, 88);
        assert_eq!(result.normalized.batch_id, id);
        assert_eq!(result.normalized.request_ids, vec!["r0", "r1", "r2", "r3"]);
        assert!(result.leftover.is_none());
    }

    #[test]
    fn test_leftover_gets_fresh_nonce() {
        let batch = batch_with(&[20, 25, 20, 23, 10, 11], 4);
        let nonce = batch.nonce;
        let result = prepare(batch, 500).unwrap();

        let leftover = result.leftover.unwrap();
        assert_eq!(leftover.len(), 2);
        assert_eq!(leftover.entries[0].request_id, "r4");
        assert_ne!(leftover.nonce, nonce);
        assert_ne!(leftover.id, result.normalized.batch_id);
        assert_eq!(leftover.last_updated, 500);
        assert_eq!(leftover.running_total, 21);
    }

    #[test]
    fn test_not_ready() {
        let err = prepare(batch_with(&[1, 2], 4), 0).unwrap_err();
        assert_eq!(err, Error::BatchNotReady { entries: 2, capacity: 4 });
    }

    #[test]
    fn test_claimed_total_ignores_running_total() {
        let mut batch = batch_with(&[20, 25, 20, 23], 4);
        batch.running_total = 1;
        assert_eq!(prepare(batch, 0).unwrap().normalized.claimed_total, 88);
    }

    proptest! {
        #[test]
        fn prop_total_and_leftover(
            units in prop::collection::vec(1u64..1_000_000, 0..20),
            capacity in 1usize..8,
        ) {
            let batch = batch_with(&units, capacity);
            match prepare(batch, 0) {
                Ok(result) => {
                    prop_assert!(units.len() >= capacity);
                    prop_assert_eq!(result.normalized.len(), capacity);
                    prop_assert_eq!(
                        result.normalized.claimed_total,
                        units[..capacity].iter().sum::<u64>()
                    );
                    let left = result.leftover.map(|b| b.len()).unwrap_or(0);
                    prop_assert_eq!(left, units.len() - capacity);
                }
                Err(_) => prop_assert!(units.len() < capacity),
            }
        }
    }
}
