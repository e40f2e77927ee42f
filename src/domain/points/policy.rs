//! Earning and spending rules
//!
//! Pure functions; the ledger service applies them under the per-user lock.

use chrono::{DateTime, Duration, Utc};

use super::model::{PointsLot, UsageDraw};
use crate::shared::errors::DomainError;

/// How many points a completed reservation earns and how long they are
/// held and valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarningPolicy {
    /// Earn rate in basis points of the cash amount paid (250 = 2.5%)
    pub earn_rate_bps: i64,
    /// Cap per reservation, 0 = uncapped
    pub max_earn_per_reservation: i64,
    pub hold: Duration,
    pub validity: Duration,
}

impl Default for EarningPolicy {
    fn default() -> Self {
        Self {
            earn_rate_bps: 250,
            max_earn_per_reservation: 0,
            hold: Duration::days(7),
            validity: Duration::days(365),
        }
    }
}

impl EarningPolicy {
    /// Points for `paid` currency units, rounded down.
    pub fn points_for(&self, paid: i64) -> i64 {
        if paid <= 0 || self.earn_rate_bps <= 0 {
            return 0;
        }
        let earned = paid.saturating_mul(self.earn_rate_bps) / 10_000;
        if self.max_earn_per_reservation > 0 {
            earned.min(self.max_earn_per_reservation)
        } else {
            earned
        }
    }

    pub fn activates_at(&self, earned_at: DateTime<Utc>) -> DateTime<Utc> {
        earned_at + self.hold
    }

    pub fn expires_at(&self, earned_at: DateTime<Utc>) -> DateTime<Utc> {
        self.activates_at(earned_at) + self.validity
    }
}

/// Order lots for consumption: oldest issue first, id as tie-break so the
/// order is total.
pub fn fifo_order(lots: &mut [PointsLot]) {
    lots.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.id.cmp(&b.id)));
}

/// Plan a FIFO spend of `amount` across `lots`.
///
/// Only lots spendable at `now` are considered. Either the full amount is
/// covered and the draws are returned in order, or nothing is drawn and
/// `InsufficientPoints` reports the spendable total.
pub fn plan_draws(
    lots: &[PointsLot],
    amount: i64,
    now: DateTime<Utc>,
) -> Result<Vec<UsageDraw>, DomainError> {
    if amount <= 0 {
        return Err(DomainError::Validation(
            "points amount must be positive".to_string(),
        ));
    }

    let mut candidates: Vec<PointsLot> = lots
        .iter()
        .filter(|lot| lot.is_spendable_at(now))
        .cloned()
        .collect();
    fifo_order(&mut candidates);

    let available: i64 = candidates.iter().map(|lot| lot.remaining).sum();
    if available < amount {
        return Err(DomainError::InsufficientPoints {
            requested: amount,
            available,
        });
    }

    let mut outstanding = amount;
    let mut draws = Vec::new();
    for lot in &candidates {
        if outstanding == 0 {
            break;
        }
        let take = outstanding.min(lot.remaining);
        draws.push(UsageDraw {
            lot_id: lot.id,
            amount: take,
        });
        outstanding -= take;
    }

    Ok(draws)
}
