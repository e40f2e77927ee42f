//! Reservation domain entity

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::errors::DomainError;

/// Reservation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Created, waiting for deposit capture or shop approval
    Requested,
    /// Slot is firmly held for the customer
    Confirmed,
    /// Customer checked in, service started
    InProgress,
    /// Service delivered
    Completed,
    CancelledByUser,
    CancelledByShop,
    /// Customer never checked in before the grace deadline
    NoShow,
}

impl ReservationStatus {
    pub const ALL: [ReservationStatus; 7] = [
        Self::Requested,
        Self::Confirmed,
        Self::InProgress,
        Self::Completed,
        Self::CancelledByUser,
        Self::CancelledByShop,
        Self::NoShow,
    ];

    /// States that occupy capacity in a slot.
    pub const ACTIVE: [ReservationStatus; 3] = [Self::Requested, Self::Confirmed, Self::InProgress];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::CancelledByUser => "cancelled_by_user",
            Self::CancelledByShop => "cancelled_by_shop",
            Self::NoShow => "no_show",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CancelledByUser | Self::CancelledByShop | Self::NoShow
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::CancelledByUser | Self::CancelledByShop)
    }
}

impl FromStr for ReservationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::Validation(format!("unknown reservation status '{s}'")))
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who requested a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Customer,
    Shop,
    System,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Shop => "shop",
            Self::System => "system",
        }
    }
}

impl FromStr for Actor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "shop" => Ok(Self::Shop),
            "system" => Ok(Self::System),
            other => Err(DomainError::Validation(format!("unknown actor '{other}'"))),
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deposit settlement state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    /// Service has no deposit
    NotRequired,
    /// Capture requested, gateway has not confirmed yet
    Pending,
    Captured,
    Refunded,
    /// Capture never happened and never will
    Voided,
    /// Kept by the shop (no-show, late cancellation)
    Forfeited,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRequired => "not_required",
            Self::Pending => "pending",
            Self::Captured => "captured",
            Self::Refunded => "refunded",
            Self::Voided => "voided",
            Self::Forfeited => "forfeited",
        }
    }
}

impl FromStr for DepositStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_required" => Ok(Self::NotRequired),
            "pending" => Ok(Self::Pending),
            "captured" => Ok(Self::Captured),
            "refunded" => Ok(Self::Refunded),
            "voided" => Ok(Self::Voided),
            "forfeited" => Ok(Self::Forfeited),
            other => Err(DomainError::Validation(format!("unknown deposit status '{other}'"))),
        }
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a reservation was cancelled. Drives refund and point-reversal policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    /// Customer changed plans
    CustomerRequest,
    /// Shop cannot serve the slot (staff sick, double-booked offline)
    ShopUnavailable,
    /// Shop declined the request
    ShopRejected,
    /// Deposit capture failed
    PaymentFailed,
    /// Request was never confirmed before its start time
    ConfirmationTimeout,
    Other,
}

impl CancellationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CustomerRequest => "customer_request",
            Self::ShopUnavailable => "shop_unavailable",
            Self::ShopRejected => "shop_rejected",
            Self::PaymentFailed => "payment_failed",
            Self::ConfirmationTimeout => "confirmation_timeout",
            Self::Other => "other",
        }
    }
}

impl FromStr for CancellationReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer_request" => Ok(Self::CustomerRequest),
            "shop_unavailable" => Ok(Self::ShopUnavailable),
            "shop_rejected" => Ok(Self::ShopRejected),
            "payment_failed" => Ok(Self::PaymentFailed),
            "confirmation_timeout" => Ok(Self::ConfirmationTimeout),
            "other" => Ok(Self::Other),
            other => Err(DomainError::Validation(format!(
                "unknown cancellation reason '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A customer's booking of one or more services in a shop slot.
///
/// Amounts are in the smallest currency unit (KRW has no minor unit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub customer_id: Uuid,
    pub service_ids: Vec<Uuid>,
    /// Shop-local date of the slot
    pub reservation_date: NaiveDate,
    /// Shop-local start time of the slot
    pub reservation_time: NaiveTime,
    pub duration_minutes: i32,
    pub status: ReservationStatus,
    pub total_amount: i64,
    pub deposit_amount: i64,
    pub deposit_status: DepositStatus,
    /// What the customer still owes at the shop
    pub remaining_amount: i64,
    pub points_used: i64,
    pub points_usage_id: Option<Uuid>,
    pub points_earned: i64,
    pub special_requests: Option<String>,
    pub cancellation_reason: Option<CancellationReason>,
    pub requested_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub no_show_at: Option<DateTime<Utc>>,
    pub review_deadline: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every transition
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Shop-local start of the slot.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.reservation_date.and_time(self.reservation_time)
    }

    /// Shop-local end of the slot (exclusive).
    pub fn ends_at(&self) -> NaiveDateTime {
        self.starts_at() + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whether the `[start, end)` intervals of the two reservations intersect.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.starts_at() < end && start < self.ends_at()
    }
}

/// `total - deposit - points * point_value`, or a validation error when
/// the result would be negative.
pub fn remaining_amount(
    total_amount: i64,
    deposit_amount: i64,
    points_used: i64,
    point_value: i64,
) -> Result<i64, DomainError> {
    let points_value = points_used
        .checked_mul(point_value)
        .ok_or_else(|| DomainError::Validation("points value overflows".to_string()))?;
    let remaining = total_amount - deposit_amount - points_value;
    if remaining < 0 {
        return Err(DomainError::Validation(format!(
            "deposit ({deposit_amount}) plus points ({points_value}) exceed total amount ({total_amount})"
        )));
    }
    Ok(remaining)
}

// ── Tests ──────────────────────────────────────────────────────
