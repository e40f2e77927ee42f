//! Reservation state machine
//!
//! The only writer of reservation status. Every change is checked against
//! the allow-list, persisted together with its audit row under the
//! optimistic version, and announced through the event dispatcher once
//! committed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::events::EventDispatcher;
use crate::config::BookingConfig;
use crate::domain::events::{
    ReservationCancelledEvent, ReservationCompletedEvent, ReservationEvent, ReservationNoShowEvent,
};
use crate::domain::points::EarningPolicy;
use crate::domain::reservation::transition;
use crate::domain::{
    Actor, CancellationReason, DepositStatus, DomainError, DomainEvent, DomainResult,
    RepositoryProvider, Reservation, ReservationStatus, StateTransition,
};
use crate::shared::clock::{to_local, SharedClock};

const MAX_VERSION_RETRIES: u32 = 3;

/// Extra input for a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    /// Required meaning for cancellations; defaults by actor when absent
    pub cancellation_reason: Option<CancellationReason>,
    /// Overrides the deposit status the transition would otherwise derive
    pub deposit_status: Option<DepositStatus>,
    /// Free-text reason for the audit row
    pub note: Option<String>,
    pub metadata: serde_json::Value,
}

impl TransitionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reason(mut self, reason: CancellationReason) -> Self {
        self.cancellation_reason = Some(reason);
        self
    }

    pub fn with_deposit(mut self, status: DepositStatus) -> Self {
        self.deposit_status = Some(status);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

pub struct ReservationStateMachine {
    repos: Arc<dyn RepositoryProvider>,
    dispatcher: EventDispatcher,
    clock: SharedClock,
    config: BookingConfig,
    earning: EarningPolicy,
}

impl ReservationStateMachine {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        dispatcher: EventDispatcher,
        clock: SharedClock,
        config: BookingConfig,
        earning: EarningPolicy,
    ) -> Self {
        Self {
            repos,
            dispatcher,
            clock,
            config,
            earning,
        }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Persist a new reservation in `requested` or `confirmed` with its
    /// creation audit row, then emit the matching event.
    pub async fn create(&self, mut reservation: Reservation, actor: Actor) -> DomainResult<Reservation> {
        if !matches!(
            reservation.status,
            ReservationStatus::Requested | ReservationStatus::Confirmed
        ) {
            return Err(DomainError::Validation(format!(
                "a reservation cannot be created in status {}",
                reservation.status
            )));
        }

        let now = self.clock.now();
        reservation.requested_at = now;
        reservation.created_at = now;
        reservation.updated_at = now;
        reservation.version = 1;
        if reservation.status == ReservationStatus::Confirmed {
            reservation.confirmed_at = Some(now);
        }

        let created = StateTransition::new(
            reservation.id,
            None,
            reservation.status,
            actor,
            None,
            json!({
                "shop_id": reservation.shop_id,
                "services": reservation.service_ids,
                "deposit_amount": reservation.deposit_amount,
                "points_used": reservation.points_used,
            }),
            now,
        );

        self.repos
            .reservations()
            .insert(reservation.clone(), created)
            .await?;

        info!(
            reservation_id = %reservation.id,
            shop_id = %reservation.shop_id,
            customer_id = %reservation.customer_id,
            date = %reservation.reservation_date,
            time = %reservation.reservation_time,
            status = %reservation.status,
            "Reservation created"
        );
        metrics::counter!(
            "booking_transitions_total",
            "from" => "none",
            "to" => reservation.status.as_str()
        )
        .increment(1);

        let event = ReservationEvent {
            reservation_id: reservation.id,
            shop_id: reservation.shop_id,
            customer_id: reservation.customer_id,
            reservation_date: reservation.reservation_date,
            reservation_time: reservation.reservation_time,
            actor,
            timestamp: now,
        };
        let event = match reservation.status {
            ReservationStatus::Confirmed => DomainEvent::ReservationConfirmed(event),
            _ => DomainEvent::ReservationRequested(event),
        };
        self.dispatcher.dispatch(event).await;

        Ok(reservation)
    }

    /// Move reservation `id` to `to` on behalf of `actor`.
    ///
    /// A lost version race is retried against the reloaded row, so the
    /// loser of two concurrent transitions is re-validated and typically
    /// sees `InvalidStateTransition`.
    pub async fn transition(
        &self,
        id: Uuid,
        to: ReservationStatus,
        actor: Actor,
        ctx: TransitionContext,
    ) -> DomainResult<Reservation> {
        let mut attempt = 1;
        loop {
            let current = self
                .repos
                .reservations()
                .find_by_id(id)
                .await?
                .ok_or_else(|| DomainError::not_found("Reservation", "id", id))?;

            let now = self.clock.now();
            let (next, audit) = match self.prepare(&current, to, actor, &ctx, now) {
                Ok(prepared) => prepared,
                Err(e) => {
                    error!(
                        reservation_id = %id,
                        from = %current.status,
                        to = %to,
                        actor = %actor,
                        version = current.version,
                        error = %e,
                        "Rejected reservation transition"
                    );
                    metrics::counter!(
                        "booking_transition_rejections_total",
                        "to" => to.as_str()
                    )
                    .increment(1);
                    return Err(e);
                }
            };

            match self
                .repos
                .reservations()
                .apply_transition(next.clone(), current.version, audit)
                .await
            {
                Ok(()) => {
                    info!(
                        reservation_id = %id,
                        from = %current.status,
                        to = %next.status,
                        actor = %actor,
                        version = next.version,
                        "Reservation transitioned"
                    );
                    metrics::counter!(
                        "booking_transitions_total",
                        "from" => current.status.as_str(),
                        "to" => next.status.as_str()
                    )
                    .increment(1);

                    if let Some(event) = Self::event_for(&next, actor, now) {
                        self.dispatcher.dispatch(event).await;
                    }
                    return Ok(next);
                }
                Err(DomainError::ConcurrentModification { .. }) if attempt < MAX_VERSION_RETRIES => {
                    warn!(
                        reservation_id = %id,
                        attempt,
                        expected_version = current.version,
                        "Reservation changed underneath transition, reloading"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Move the deposit of reservation `id` from `from` to `to` without
    /// touching its status. The change is audited and version-guarded like
    /// a transition.
    ///
    /// Returns `None` when the deposit is no longer in `from`, so of two
    /// racing callers only one sees `Some`.
    pub async fn settle_deposit(
        &self,
        id: Uuid,
        from: DepositStatus,
        to: DepositStatus,
        actor: Actor,
        note: &str,
    ) -> DomainResult<Option<Reservation>> {
        let mut attempt = 1;
        loop {
            let current = self
                .repos
                .reservations()
                .find_by_id(id)
                .await?
                .ok_or_else(|| DomainError::not_found("Reservation", "id", id))?;
            if current.deposit_status != from {
                return Ok(None);
            }

            let now = self.clock.now();
            let mut next = current.clone();
            next.deposit_status = to;
            next.version = current.version + 1;
            next.updated_at = now;

            let audit = StateTransition::new(
                current.id,
                Some(current.status),
                current.status,
                actor,
                Some(note.to_string()),
                json!({ "deposit_from": from, "deposit_status": to }),
                now,
            );

            match self
                .repos
                .reservations()
                .apply_transition(next.clone(), current.version, audit)
                .await
            {
                Ok(()) => {
                    info!(reservation_id = %id, from = %from, to = %to, actor = %actor, "Deposit settled");
                    return Ok(Some(next));
                }
                Err(DomainError::ConcurrentModification { .. }) if attempt < MAX_VERSION_RETRIES => {
                    warn!(reservation_id = %id, attempt, "Reservation changed underneath deposit update, reloading");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Validate and compute the next row and its audit record. Writes
    /// nothing.
    pub fn prepare(
        &self,
        current: &Reservation,
        to: ReservationStatus,
        actor: Actor,
        ctx: &TransitionContext,
        now: DateTime<Utc>,
    ) -> DomainResult<(Reservation, StateTransition)> {
        transition::validate(current.status, to, actor)?;

        let mut next = current.clone();
        next.status = to;
        next.version = current.version + 1;
        next.updated_at = now;

        match to {
            ReservationStatus::Confirmed => {
                next.confirmed_at = Some(now);
            }
            ReservationStatus::InProgress => {
                next.started_at = Some(now);
            }
            ReservationStatus::Completed => {
                next.completed_at = Some(now);
                next.review_deadline = Some(now + Duration::days(self.config.review_window_days));
                let paid = current.total_amount
                    - current.points_used.saturating_mul(self.config.point_value);
                next.points_earned = self.earning.points_for(paid);
                if current.status == ReservationStatus::Confirmed && next.started_at.is_none() {
                    debug!(reservation_id = %current.id, "Completed without check-in");
                }
            }
            ReservationStatus::CancelledByUser | ReservationStatus::CancelledByShop => {
                next.cancelled_at = Some(now);
                next.cancellation_reason =
                    Some(ctx.cancellation_reason.unwrap_or(match actor {
                        Actor::Customer => CancellationReason::CustomerRequest,
                        Actor::Shop => CancellationReason::ShopUnavailable,
                        Actor::System => CancellationReason::Other,
                    }));
                next.deposit_status = self.deposit_after_cancel(current, actor, now);
            }
            ReservationStatus::NoShow => {
                next.no_show_at = Some(now);
                next.deposit_status = match current.deposit_status {
                    DepositStatus::Captured => DepositStatus::Forfeited,
                    DepositStatus::Pending => DepositStatus::Voided,
                    other => other,
                };
            }
            ReservationStatus::Requested => {}
        }

        if let Some(deposit) = ctx.deposit_status {
            next.deposit_status = deposit;
        }

        let reason = next
            .cancellation_reason
            .filter(|_| next.status.is_cancelled())
            .map(|r| r.as_str().to_string())
            .or_else(|| ctx.note.clone());
        let metadata = if ctx.metadata.is_null() {
            json!({ "deposit_status": next.deposit_status })
        } else {
            ctx.metadata.clone()
        };

        let audit = StateTransition::new(
            current.id,
            Some(current.status),
            to,
            actor,
            reason,
            metadata,
            now,
        );

        Ok((next, audit))
    }

    /// Refund policy: shop-side cancellations always refund a captured
    /// deposit; customers get it back only when cancelling early enough.
    fn deposit_after_cancel(
        &self,
        current: &Reservation,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> DepositStatus {
        match current.deposit_status {
            DepositStatus::Pending => DepositStatus::Voided,
            DepositStatus::Captured => match actor {
                Actor::Shop | Actor::System => DepositStatus::Refunded,
                Actor::Customer => {
                    let local_now = to_local(now, self.config.shop_offset());
                    let notice = current.starts_at() - local_now;
                    if notice >= Duration::hours(self.config.free_cancellation_hours) {
                        DepositStatus::Refunded
                    } else {
                        DepositStatus::Forfeited
                    }
                }
            },
            other => other,
        }
    }

    fn event_for(next: &Reservation, actor: Actor, now: DateTime<Utc>) -> Option<DomainEvent> {
        let basic = || ReservationEvent {
            reservation_id: next.id,
            shop_id: next.shop_id,
            customer_id: next.customer_id,
            reservation_date: next.reservation_date,
            reservation_time: next.reservation_time,
            actor,
            timestamp: now,
        };

        match next.status {
            ReservationStatus::Requested => None,
            ReservationStatus::Confirmed => Some(DomainEvent::ReservationConfirmed(basic())),
            ReservationStatus::InProgress => Some(DomainEvent::ReservationStarted(basic())),
            ReservationStatus::Completed => {
                Some(DomainEvent::ReservationCompleted(ReservationCompletedEvent {
                    reservation_id: next.id,
                    shop_id: next.shop_id,
                    customer_id: next.customer_id,
                    points_earned: next.points_earned,
                    timestamp: now,
                }))
            }
            ReservationStatus::CancelledByUser | ReservationStatus::CancelledByShop => {
                Some(DomainEvent::ReservationCancelled(ReservationCancelledEvent {
                    reservation_id: next.id,
                    shop_id: next.shop_id,
                    customer_id: next.customer_id,
                    actor,
                    reason: next
                        .cancellation_reason
                        .unwrap_or(CancellationReason::Other),
                    deposit_status: next.deposit_status,
                    refund_amount: refund_amount(next),
                    points_usage_id: next.points_usage_id,
                    timestamp: now,
                }))
            }
            ReservationStatus::NoShow => {
                Some(DomainEvent::ReservationNoShow(ReservationNoShowEvent {
                    reservation_id: next.id,
                    shop_id: next.shop_id,
                    customer_id: next.customer_id,
                    forfeited_deposit: if next.deposit_status == DepositStatus::Forfeited {
                        next.deposit_amount
                    } else {
                        0
                    },
                    timestamp: now,
                }))
            }
        }
    }
}

/// Deposit owed back to the customer after a cancellation.
pub fn refund_amount(reservation: &Reservation) -> i64 {
    if reservation.deposit_status == DepositStatus::Refunded {
        reservation.deposit_amount
    } else {
        0
    }
}
