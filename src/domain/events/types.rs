//! Domain events
//!
//! Emitted after a reservation transition or ledger mutation has been
//! committed. The points ledger consumes reservation events; the
//! notification forwarder relays all of them.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::reservation::{Actor, CancellationReason, DepositStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DomainEvent {
    ReservationRequested(ReservationEvent),
    ReservationConfirmed(ReservationEvent),
    ReservationStarted(ReservationEvent),
    ReservationCompleted(ReservationCompletedEvent),
    ReservationCancelled(ReservationCancelledEvent),
    ReservationNoShow(ReservationNoShowEvent),
    PointsEarned(PointsLotEvent),
    PointsActivated(PointsLotEvent),
    PointsExpired(PointsLotEvent),
    PointsUsed(PointsUsageEvent),
    PointsRestored(PointsUsageEvent),
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::ReservationRequested(_) => "reservation_requested",
            DomainEvent::ReservationConfirmed(_) => "reservation_confirmed",
            DomainEvent::ReservationStarted(_) => "reservation_started",
            DomainEvent::ReservationCompleted(_) => "reservation_completed",
            DomainEvent::ReservationCancelled(_) => "reservation_cancelled",
            DomainEvent::ReservationNoShow(_) => "reservation_no_show",
            DomainEvent::PointsEarned(_) => "points_earned",
            DomainEvent::PointsActivated(_) => "points_activated",
            DomainEvent::PointsExpired(_) => "points_expired",
            DomainEvent::PointsUsed(_) => "points_used",
            DomainEvent::PointsRestored(_) => "points_restored",
        }
    }

    pub fn reservation_id(&self) -> Option<Uuid> {
        match self {
            DomainEvent::ReservationRequested(e)
            | DomainEvent::ReservationConfirmed(e)
            | DomainEvent::ReservationStarted(e) => Some(e.reservation_id),
            DomainEvent::ReservationCompleted(e) => Some(e.reservation_id),
            DomainEvent::ReservationCancelled(e) => Some(e.reservation_id),
            DomainEvent::ReservationNoShow(e) => Some(e.reservation_id),
            DomainEvent::PointsEarned(e) => e.reservation_id,
            DomainEvent::PointsActivated(_) | DomainEvent::PointsExpired(_) => None,
            DomainEvent::PointsUsed(e) | DomainEvent::PointsRestored(e) => e.reservation_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationEvent {
    pub reservation_id: Uuid,
    pub shop_id: Uuid,
    pub customer_id: Uuid,
    pub reservation_date: NaiveDate,
    pub reservation_time: NaiveTime,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationCompletedEvent {
    pub reservation_id: Uuid,
    pub shop_id: Uuid,
    pub customer_id: Uuid,
    /// Points to credit as a pending lot
    pub points_earned: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationCancelledEvent {
    pub reservation_id: Uuid,
    pub shop_id: Uuid,
    pub customer_id: Uuid,
    pub actor: Actor,
    pub reason: CancellationReason,
    pub deposit_status: DepositStatus,
    /// Deposit to hand back through the payment gateway, 0 if none
    pub refund_amount: i64,
    /// Spend to reverse in the ledger
    pub points_usage_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationNoShowEvent {
    pub reservation_id: Uuid,
    pub shop_id: Uuid,
    pub customer_id: Uuid,
    pub forfeited_deposit: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsLotEvent {
    pub lot_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub reservation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsUsageEvent {
    pub usage_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub reservation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}
