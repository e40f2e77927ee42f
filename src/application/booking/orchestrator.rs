//! Booking orchestrator
//!
//! Entry point for booking requests, shop actions and payment webhooks.
//! Creation runs its decision (conflict check, points spend, insert) inside
//! the slot lock; gateway calls happen after the lock is released and after
//! the transition they follow has committed.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::conflict::{ConflictDetector, ConflictResult};
use super::slot_lock::{SlotKey, SlotLockManager};
use super::state_machine::{refund_amount, ReservationStateMachine, TransitionContext};
use crate::application::points::PointsLedger;
use crate::application::ports::{CaptureStatus, PaymentGateway, PaymentOutcome};
use crate::config::BookingConfig;
use crate::domain::reservation::remaining_amount;
use crate::domain::{
    Actor, CancellationReason, DepositStatus, DomainError, DomainResult, RepositoryProvider,
    Reservation, ReservationStatus, Shop, ShopService, StateTransition,
};
use crate::shared::clock::{to_local, SharedClock};
use crate::shared::utils::{retry_with_backoff, RetryConfig};

/// A customer's booking request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateReservationRequest {
    pub shop_id: Uuid,
    pub customer_id: Uuid,
    #[validate(length(min = 1, max = 10, message = "between 1 and 10 services per booking"))]
    pub service_ids: Vec<Uuid>,
    /// Shop-local date
    pub reservation_date: NaiveDate,
    /// Shop-local start time
    pub reservation_time: NaiveTime,
    #[validate(range(min = 0, message = "points_to_use must be non-negative"))]
    #[serde(default)]
    pub points_to_use: i64,
    #[validate(length(max = 500, message = "special requests are limited to 500 characters"))]
    pub special_requests: Option<String>,
}

pub struct BookingOrchestrator {
    repos: Arc<dyn RepositoryProvider>,
    slot_locks: SlotLockManager,
    state_machine: Arc<ReservationStateMachine>,
    ledger: Arc<PointsLedger>,
    settlement: Settlement,
    clock: SharedClock,
    config: BookingConfig,
}

impl BookingOrchestrator {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        state_machine: Arc<ReservationStateMachine>,
        ledger: Arc<PointsLedger>,
        gateway: Arc<dyn PaymentGateway>,
        clock: SharedClock,
        config: BookingConfig,
    ) -> Self {
        let settlement = Settlement {
            repos: repos.clone(),
            state_machine: state_machine.clone(),
            gateway,
            retry: RetryConfig {
                max_attempts: config.payment_max_attempts,
                ..RetryConfig::default()
            },
        };
        Self {
            repos,
            slot_locks: SlotLockManager::new(config.lock_timeout()),
            state_machine,
            ledger,
            settlement,
            clock,
            config,
        }
    }

    pub fn slot_locks(&self) -> &SlotLockManager {
        &self.slot_locks
    }

    // ── Creation ───────────────────────────────────────────────

    pub async fn create_reservation(
        &self,
        req: CreateReservationRequest,
    ) -> DomainResult<Reservation> {
        let result = self.try_create(req).await;
        let outcome = match &result {
            Ok(_) => "created",
            Err(e) => e.code(),
        };
        metrics::counter!("booking_requests_total", "outcome" => outcome).increment(1);
        result
    }

    async fn try_create(&self, req: CreateReservationRequest) -> DomainResult<Reservation> {
        req.validate()?;

        let shop = self
            .repos
            .shops()
            .find_shop(req.shop_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Shop", "id", req.shop_id))?;
        if !shop.is_active {
            return Err(DomainError::Validation(format!(
                "shop {} is not accepting bookings",
                shop.id
            )));
        }

        let services = self.load_services(&shop, &req.service_ids).await?;
        let candidate = self.build_candidate(&shop, &services, &req)?;
        let exclusive: HashSet<Uuid> = services
            .iter()
            .filter(|s| s.exclusive)
            .map(|s| s.id)
            .collect();

        let slot = SlotKey::new(shop.id, req.reservation_date, req.reservation_time);
        let (shop_ref, exclusive_ref) = (&shop, &exclusive);
        let reservation = if exclusive.is_empty() {
            self.slot_locks
                .with_slot_lock(slot, move || self.decide(candidate, shop_ref, exclusive_ref))
                .await?
        } else {
            // Day lock first, then slot: a fixed order across all requests.
            let day = SlotKey::whole_day(shop.id, req.reservation_date);
            self.slot_locks
                .with_slot_lock(day, move || {
                    self.slot_locks.with_slot_lock(slot, move || {
                        self.decide(candidate, shop_ref, exclusive_ref)
                    })
                })
                .await?
        };

        if reservation.deposit_status == DepositStatus::Pending {
            self.settlement
                .spawn_capture(reservation.id, reservation.deposit_amount);
        }
        Ok(reservation)
    }

    /// The critical section: read, check, spend, insert.
    async fn decide(
        &self,
        mut candidate: Reservation,
        shop: &Shop,
        exclusive: &HashSet<Uuid>,
    ) -> DomainResult<Reservation> {
        let existing = self
            .repos
            .reservations()
            .find_active_for_shop_on_date(shop.id, candidate.reservation_date)
            .await?;

        let verdict = ConflictDetector::check(&candidate, &existing, shop, exclusive);
        if verdict != ConflictResult::Clear {
            info!(
                shop_id = %shop.id,
                date = %candidate.reservation_date,
                time = %candidate.reservation_time,
                verdict = %verdict.describe(),
                "Slot unavailable"
            );
            return Err(DomainError::SlotUnavailable {
                reason: verdict.describe(),
            });
        }

        let now = self.clock.now();
        let usage = if candidate.points_used > 0 {
            let usage = self
                .ledger
                .use_points(
                    candidate.customer_id,
                    candidate.points_used,
                    Some(candidate.id),
                    now,
                )
                .await?;
            candidate.points_usage_id = Some(usage.id);
            Some(usage)
        } else {
            None
        };

        match self
            .state_machine
            .create(candidate, Actor::Customer)
            .await
        {
            Ok(created) => Ok(created),
            Err(e) => {
                if let Some(usage) = usage {
                    if let Err(restore_err) = self.ledger.restore_usage(usage.id, now).await {
                        error!(
                            usage_id = %usage.id,
                            error = %restore_err,
                            "Failed to reverse points after reservation insert failed"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn load_services(
        &self,
        shop: &Shop,
        requested: &[Uuid],
    ) -> DomainResult<Vec<ShopService>> {
        let mut unique = Vec::with_capacity(requested.len());
        for id in requested {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }

        let services = self.repos.shops().find_services(shop.id, &unique).await?;
        for id in &unique {
            match services.iter().find(|s| s.id == *id) {
                None => return Err(DomainError::not_found("ShopService", "id", id)),
                Some(s) if !s.is_active => {
                    return Err(DomainError::Validation(format!(
                        "service '{}' is not bookable",
                        s.name
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(services)
    }

    fn build_candidate(
        &self,
        shop: &Shop,
        services: &[ShopService],
        req: &CreateReservationRequest,
    ) -> DomainResult<Reservation> {
        let duration_minutes: i32 = services.iter().map(|s| s.duration_minutes).sum();
        let total_amount: i64 = services.iter().map(|s| s.price).sum();
        let deposit_amount: i64 = services.iter().map(|s| s.deposit_amount).sum();

        let start = req.reservation_date.and_time(req.reservation_time);
        let end = start + ChronoDuration::minutes(i64::from(duration_minutes));
        if !shop.is_aligned(req.reservation_time) {
            return Err(DomainError::Validation(format!(
                "start time {} is not on the shop's {}-minute grid",
                req.reservation_time.format("%H:%M"),
                shop.slot_interval_minutes
            )));
        }
        if !shop.is_within_hours(start, end) {
            return Err(DomainError::Validation(format!(
                "{}-{} is outside operating hours {}-{}",
                start.format("%H:%M"),
                end.format("%H:%M"),
                shop.opening_time.format("%H:%M"),
                shop.closing_time.format("%H:%M")
            )));
        }

        let now = self.clock.now();
        let local_now = to_local(now, self.config.shop_offset());
        if start <= local_now {
            return Err(DomainError::Validation(
                "cannot book a slot in the past".to_string(),
            ));
        }
        if req.reservation_date > local_now.date() + ChronoDuration::days(self.config.max_advance_days)
        {
            return Err(DomainError::Validation(format!(
                "bookings open at most {} days ahead",
                self.config.max_advance_days
            )));
        }

        let remaining = remaining_amount(
            total_amount,
            deposit_amount,
            req.points_to_use,
            self.config.point_value,
        )?;

        let (status, deposit_status) = if deposit_amount > 0 {
            (ReservationStatus::Requested, DepositStatus::Pending)
        } else if shop.auto_confirm {
            (ReservationStatus::Confirmed, DepositStatus::NotRequired)
        } else {
            (ReservationStatus::Requested, DepositStatus::NotRequired)
        };

        Ok(Reservation {
            id: Uuid::new_v4(),
            shop_id: shop.id,
            customer_id: req.customer_id,
            service_ids: services.iter().map(|s| s.id).collect(),
            reservation_date: req.reservation_date,
            reservation_time: req.reservation_time,
            duration_minutes,
            status,
            total_amount,
            deposit_amount,
            deposit_status,
            remaining_amount: remaining,
            points_used: req.points_to_use,
            points_usage_id: None,
            points_earned: 0,
            special_requests: req.special_requests.clone(),
            cancellation_reason: None,
            requested_at: now,
            confirmed_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            no_show_at: None,
            review_deadline: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    // ── Lifecycle actions ──────────────────────────────────────

    /// Cancel on behalf of the customer or the shop. Any deposit refund is
    /// sent to the gateway once the cancellation has committed.
    pub async fn cancel_reservation(
        &self,
        id: Uuid,
        actor: Actor,
        reason: Option<CancellationReason>,
    ) -> DomainResult<Reservation> {
        let to = match actor {
            Actor::Customer => ReservationStatus::CancelledByUser,
            Actor::Shop | Actor::System => ReservationStatus::CancelledByShop,
        };
        let mut ctx = TransitionContext::new();
        if let Some(reason) = reason {
            ctx = ctx.with_reason(reason);
        }

        let cancelled = self.state_machine.transition(id, to, actor, ctx).await?;
        let refund = refund_amount(&cancelled);
        if refund > 0 {
            self.settlement.spawn_refund(cancelled.id, refund);
        }
        Ok(cancelled)
    }

    /// Shop approval of a request. Refused while the deposit is still
    /// being captured; the payment webhook confirms those.
    pub async fn confirm_reservation(&self, id: Uuid) -> DomainResult<Reservation> {
        let current = self.get_reservation(id).await?;
        if current.deposit_status == DepositStatus::Pending {
            return Err(DomainError::Validation(
                "deposit has not been captured yet".to_string(),
            ));
        }
        self.state_machine
            .transition(id, ReservationStatus::Confirmed, Actor::Shop, TransitionContext::new())
            .await
    }

    /// Customer checked in at the shop.
    pub async fn start_service(&self, id: Uuid) -> DomainResult<Reservation> {
        self.state_machine
            .transition(id, ReservationStatus::InProgress, Actor::Shop, TransitionContext::new())
            .await
    }

    pub async fn complete_reservation(&self, id: Uuid, actor: Actor) -> DomainResult<Reservation> {
        self.state_machine
            .transition(id, ReservationStatus::Completed, actor, TransitionContext::new())
            .await
    }

    /// Reconcile a payment result (gateway response or webhook).
    /// Duplicate deliveries leave the reservation unchanged.
    pub async fn handle_payment_result(
        &self,
        id: Uuid,
        outcome: PaymentOutcome,
    ) -> DomainResult<Reservation> {
        self.settlement.apply(id, outcome).await
    }

    // ── Queries ────────────────────────────────────────────────

    pub async fn get_reservation(&self, id: Uuid) -> DomainResult<Reservation> {
        self.repos
            .reservations()
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Reservation", "id", id))
    }

    /// Audit trail, oldest first.
    pub async fn reservation_history(&self, id: Uuid) -> DomainResult<Vec<StateTransition>> {
        self.get_reservation(id).await?;
        self.repos.reservations().transitions_for(id).await
    }

    pub async fn reservations_for_customer(
        &self,
        customer_id: Uuid,
    ) -> DomainResult<Vec<Reservation>> {
        self.repos.reservations().find_for_customer(customer_id).await
    }
}

/// Deposit capture, refunds and payment reconciliation. Cloneable so the
/// gateway calls can run on their own tasks.
#[derive(Clone)]
struct Settlement {
    repos: Arc<dyn RepositoryProvider>,
    state_machine: Arc<ReservationStateMachine>,
    gateway: Arc<dyn PaymentGateway>,
    retry: RetryConfig,
}

impl Settlement {
    fn spawn_capture(&self, reservation_id: Uuid, amount: i64) {
        let this = self.clone();
        tokio::spawn(async move {
            let gateway = this.gateway.clone();
            let captured = retry_with_backoff(
                this.retry.clone(),
                || gateway.capture_deposit(reservation_id, amount),
                |e| e.is_transient(),
                "capture_deposit",
            )
            .await;

            let outcome = match captured {
                Ok(CaptureStatus::Captured) => PaymentOutcome::Captured,
                Ok(CaptureStatus::Deferred) => {
                    debug!(%reservation_id, "Deposit capture deferred to webhook");
                    return;
                }
                Err(e) => {
                    let failure = DomainError::PaymentCaptureFailed {
                        reservation_id,
                        reason: e.to_string(),
                    };
                    warn!(%reservation_id, amount, error = %failure, "Deposit capture failed");
                    PaymentOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };

            if let Err(e) = this.apply(reservation_id, outcome).await {
                error!(%reservation_id, error = %e, "Failed to apply deposit capture result");
            }
        });
    }

    fn spawn_refund(&self, reservation_id: Uuid, amount: i64) {
        let gateway = self.gateway.clone();
        let retry = self.retry.clone();
        tokio::spawn(async move {
            match retry_with_backoff(
                retry,
                || gateway.refund(reservation_id, amount),
                |e| e.is_transient(),
                "refund_deposit",
            )
            .await
            {
                Ok(()) => {
                    info!(%reservation_id, amount, "Deposit refunded");
                    metrics::counter!("booking_refunds_total").increment(1);
                }
                Err(e) => {
                    error!(%reservation_id, amount, error = %e, "Deposit refund failed, needs manual follow-up");
                    metrics::counter!("booking_refund_failures_total").increment(1);
                }
            }
        });
    }

    async fn apply(&self, id: Uuid, outcome: PaymentOutcome) -> DomainResult<Reservation> {
        let current = self
            .repos
            .reservations()
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Reservation", "id", id))?;

        if current.deposit_status != DepositStatus::Pending {
            if outcome == PaymentOutcome::Captured && current.deposit_status == DepositStatus::Voided
            {
                // Captured after the booking was already cancelled. The deposit
                // is marked refunded before the gateway call so a redelivered
                // capture finds nothing left to refund.
                if let Some(settled) = self
                    .state_machine
                    .settle_deposit(
                        id,
                        DepositStatus::Voided,
                        DepositStatus::Refunded,
                        Actor::System,
                        "late capture refunded",
                    )
                    .await?
                {
                    warn!(reservation_id = %id, "Late deposit capture on cancelled reservation, refunding");
                    self.spawn_refund(id, settled.deposit_amount);
                    return Ok(settled);
                }
                return self
                    .repos
                    .reservations()
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("Reservation", "id", id));
            }
            debug!(reservation_id = %id, deposit = %current.deposit_status, %outcome, "Duplicate payment result ignored");
            return Ok(current);
        }

        match outcome {
            PaymentOutcome::Captured => {
                let ctx = TransitionContext::new()
                    .with_deposit(DepositStatus::Captured)
                    .with_note("deposit captured");
                self.state_machine
                    .transition(id, ReservationStatus::Confirmed, Actor::System, ctx)
                    .await
            }
            PaymentOutcome::Failed { reason } => {
                let ctx = TransitionContext::new()
                    .with_reason(CancellationReason::PaymentFailed)
                    .with_deposit(DepositStatus::Voided)
                    .with_metadata(serde_json::json!({ "gateway_reason": reason }));
                self.state_machine
                    .transition(id, ReservationStatus::CancelledByShop, Actor::System, ctx)
                    .await
            }
        }
    }
}
