//! Points lots and usage records

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::errors::DomainError;

/// Lot lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    /// Earned, inside the pending hold
    Pending,
    /// Spendable
    Active,
    /// Fully drawn
    Used,
    Expired,
    /// Voided before activation (earning reservation cancelled/disputed)
    Cancelled,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Used => "used",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for LotStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "used" => Ok(Self::Used),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::Validation(format!("unknown lot status '{other}'"))),
        }
    }
}

impl std::fmt::Display for LotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a lot's points came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ref", rename_all = "snake_case")]
pub enum LotOrigin {
    /// Earned by completing a reservation
    Reservation(Uuid),
    SignupBonus,
    /// Referral reward, optionally naming the referred user
    Referral(Option<Uuid>),
    AdminAdjustment,
    /// Re-credit of draws whose original lots expired before the refund
    RefundAdjustment(Uuid),
}

impl LotOrigin {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reservation(_) => "reservation",
            Self::SignupBonus => "signup_bonus",
            Self::Referral(_) => "referral",
            Self::AdminAdjustment => "admin_adjustment",
            Self::RefundAdjustment(_) => "refund_adjustment",
        }
    }

    pub fn reference(&self) -> Option<Uuid> {
        match self {
            Self::Reservation(id) | Self::RefundAdjustment(id) => Some(*id),
            Self::Referral(id) => *id,
            Self::SignupBonus | Self::AdminAdjustment => None,
        }
    }

    /// Rebuild from the persisted `(kind, reference)` pair.
    pub fn from_parts(kind: &str, reference: Option<Uuid>) -> Result<Self, DomainError> {
        let missing = || DomainError::Validation(format!("lot origin '{kind}' needs a reference"));
        match kind {
            "reservation" => Ok(Self::Reservation(reference.ok_or_else(missing)?)),
            "signup_bonus" => Ok(Self::SignupBonus),
            "referral" => Ok(Self::Referral(reference)),
            "admin_adjustment" => Ok(Self::AdminAdjustment),
            "refund_adjustment" => Ok(Self::RefundAdjustment(reference.ok_or_else(missing)?)),
            other => Err(DomainError::Validation(format!("unknown lot origin '{other}'"))),
        }
    }
}

/// A batch of points with its own hold and expiry; the unit of FIFO
/// consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsLot {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Amount originally issued
    pub amount: i64,
    /// Amount still spendable; `0 <= remaining <= amount`
    pub remaining: i64,
    pub origin: LotOrigin,
    pub status: LotStatus,
    pub issued_at: DateTime<Utc>,
    pub activates_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PointsLot {
    pub fn new(
        user_id: Uuid,
        amount: i64,
        origin: LotOrigin,
        status: LotStatus,
        issued_at: DateTime<Utc>,
        activates_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            remaining: amount,
            origin,
            status,
            issued_at,
            activates_at,
            expires_at,
            version: 0,
            created_at: issued_at,
            updated_at: issued_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == LotStatus::Expired || self.expires_at <= now
    }

    pub fn is_spendable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == LotStatus::Active && self.remaining > 0 && !self.is_expired_at(now)
    }

    /// Take up to `wanted` points; returns how many were taken.
    pub fn draw(&mut self, wanted: i64, now: DateTime<Utc>) -> i64 {
        let taken = wanted.min(self.remaining).max(0);
        self.remaining -= taken;
        if self.remaining == 0 {
            self.status = LotStatus::Used;
        }
        self.updated_at = now;
        taken
    }

    /// Give back points previously drawn from this lot.
    pub fn credit(&mut self, amount: i64, now: DateTime<Utc>) {
        self.remaining = (self.remaining + amount).min(self.amount);
        if self.status == LotStatus::Used && self.remaining > 0 {
            self.status = LotStatus::Active;
        }
        self.updated_at = now;
    }
}

/// One lot's contribution to a spend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDraw {
    pub lot_id: Uuid,
    pub amount: i64,
}

/// A spend event and the ordered lots it drew from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsUsage {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reservation_id: Option<Uuid>,
    pub amount: i64,
    /// In draw order (FIFO by lot issue time)
    pub draws: Vec<UsageDraw>,
    pub created_at: DateTime<Utc>,
    pub reversed_at: Option<DateTime<Utc>>,
}

impl PointsUsage {
    pub fn is_reversed(&self) -> bool {
        self.reversed_at.is_some()
    }
}

/// Point-in-time view of a user's points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBalance {
    /// Spendable now
    pub available: i64,
    /// Earned, still inside the hold
    pub pending: i64,
    /// Part of `available` that expires within the look-ahead window
    pub expiring_soon: i64,
}
