//! Reservation transition allow-list and audit record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{Actor, ReservationStatus};
use crate::shared::errors::DomainError;

use Actor::{Customer, Shop, System};
use ReservationStatus::*;

/// Every legal edge of the lifecycle, with the actors allowed to take it.
pub const ALLOWED_TRANSITIONS: &[(ReservationStatus, ReservationStatus, &[Actor])] = &[
    (Requested, Confirmed, &[Shop, System]),
    (Requested, CancelledByUser, &[Customer]),
    (Requested, CancelledByShop, &[Shop, System]),
    (Confirmed, InProgress, &[Shop]),
    (Confirmed, Completed, &[Shop, System]),
    (Confirmed, CancelledByUser, &[Customer]),
    (Confirmed, CancelledByShop, &[Shop, System]),
    (Confirmed, NoShow, &[System]),
    (InProgress, Completed, &[Shop, System]),
];

pub fn is_allowed(from: ReservationStatus, to: ReservationStatus, actor: Actor) -> bool {
    ALLOWED_TRANSITIONS
        .iter()
        .any(|(f, t, actors)| *f == from && *t == to && actors.contains(&actor))
}

pub fn validate(
    from: ReservationStatus,
    to: ReservationStatus,
    actor: Actor,
) -> Result<(), DomainError> {
    if is_allowed(from, to, actor) {
        Ok(())
    } else {
        Err(DomainError::InvalidStateTransition { from, to, actor })
    }
}

/// Append-only audit row. `from_status` is `None` for the row written
/// when the reservation is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub from_status: Option<ReservationStatus>,
    pub to_status: ReservationStatus,
    pub actor: Actor,
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl StateTransition {
    pub fn new(
        reservation_id: Uuid,
        from_status: Option<ReservationStatus>,
        to_status: ReservationStatus,
        actor: Actor,
        reason: Option<String>,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reservation_id,
            from_status,
            to_status,
            actor,
            reason,
            metadata,
            created_at: at,
        }
    }
}
