//! Points ledger service
//!
//! Owns every mutation of points lots and usage records. Mutations for one
//! user are serialized by an in-process keyed lock and guarded in storage by
//! per-lot versions; a lost version race is retried from a fresh read.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::booking::slot_lock::KeyedMutex;
use crate::application::events::{DomainEventHandler, SharedEventBus};
use crate::config::PointsConfig;
use crate::domain::events::{PointsLotEvent, PointsUsageEvent};
use crate::domain::points::{plan_draws, EarningPolicy};
use crate::domain::{
    DomainError, DomainEvent, DomainResult, LotOrigin, LotStatus, PointsBalance, PointsLot,
    PointsUsage, RepositoryProvider, ReservationStatus,
};
use crate::shared::clock::SharedClock;

const MAX_VERSION_RETRIES: u32 = 3;

pub struct PointsLedger {
    repos: Arc<dyn RepositoryProvider>,
    bus: SharedEventBus,
    clock: SharedClock,
    config: PointsConfig,
    earning: EarningPolicy,
    user_locks: KeyedMutex<Uuid>,
    lock_timeout: Duration,
}

impl PointsLedger {
    pub fn new(
        repos: Arc<dyn RepositoryProvider>,
        bus: SharedEventBus,
        clock: SharedClock,
        config: PointsConfig,
        lock_timeout: Duration,
    ) -> Self {
        let earning = config.earning_policy();
        Self {
            repos,
            bus,
            clock,
            config,
            earning,
            user_locks: KeyedMutex::new(),
            lock_timeout,
        }
    }

    pub fn earning_policy(&self) -> &EarningPolicy {
        &self.earning
    }

    // ── Spending ───────────────────────────────────────────────

    /// Spend `amount` points FIFO across the user's active lots.
    ///
    /// All-or-nothing: on `InsufficientPoints` no lot is touched.
    pub async fn use_points(
        &self,
        user_id: Uuid,
        amount: i64,
        reservation_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> DomainResult<PointsUsage> {
        let usage = self
            .serialized(user_id, move || self.try_use(user_id, amount, reservation_id, now))
            .await?;

        info!(
            %user_id,
            usage_id = %usage.id,
            amount,
            lots = usage.draws.len(),
            reservation_id = ?reservation_id,
            "Points used"
        );
        metrics::counter!("points_used_total").increment(amount as u64);
        self.bus.publish(DomainEvent::PointsUsed(PointsUsageEvent {
            usage_id: usage.id,
            user_id,
            amount,
            reservation_id,
            timestamp: now,
        }));
        Ok(usage)
    }

    async fn try_use(
        &self,
        user_id: Uuid,
        amount: i64,
        reservation_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> DomainResult<PointsUsage> {
        let lots = self.repos.points().find_lots_for_user(user_id).await?;
        let draws = plan_draws(&lots, amount, now)?;

        let mut touched = Vec::with_capacity(draws.len());
        for draw in &draws {
            let mut lot = lots
                .iter()
                .find(|l| l.id == draw.lot_id)
                .cloned()
                .ok_or_else(|| DomainError::not_found("PointsLot", "id", draw.lot_id))?;
            lot.draw(draw.amount, now);
            touched.push(lot);
        }

        let usage = PointsUsage {
            id: Uuid::new_v4(),
            user_id,
            reservation_id,
            amount,
            draws,
            created_at: now,
            reversed_at: None,
        };
        self.repos
            .points()
            .record_usage(touched, usage.clone())
            .await?;
        Ok(usage)
    }

    // ── Reversal ───────────────────────────────────────────────

    /// Give back the points of a spend. Draws from lots that are still
    /// valid go back to those lots; the rest lands in one refund
    /// adjustment lot. Reversing twice is a no-op that returns 0.
    pub async fn restore_usage(&self, usage_id: Uuid, now: DateTime<Utc>) -> DomainResult<i64> {
        let usage = self
            .repos
            .points()
            .find_usage(usage_id)
            .await?
            .ok_or_else(|| DomainError::not_found("PointsUsage", "id", usage_id))?;
        let user_id = usage.user_id;

        let restored = self
            .serialized(user_id, move || self.try_restore(usage_id, now))
            .await?;

        if let Some((usage, adjusted)) = restored {
            info!(
                %user_id,
                %usage_id,
                amount = usage.amount,
                adjusted,
                "Points restored"
            );
            metrics::counter!("points_restored_total").increment(usage.amount as u64);
            self.bus.publish(DomainEvent::PointsRestored(PointsUsageEvent {
                usage_id,
                user_id,
                amount: usage.amount,
                reservation_id: usage.reservation_id,
                timestamp: now,
            }));
            Ok(usage.amount)
        } else {
            debug!(%usage_id, "Usage already reversed");
            Ok(0)
        }
    }

    async fn try_restore(
        &self,
        usage_id: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<(PointsUsage, i64)>> {
        let Some(mut usage) = self.repos.points().find_usage(usage_id).await? else {
            return Err(DomainError::not_found("PointsUsage", "id", usage_id));
        };
        if usage.is_reversed() {
            return Ok(None);
        }

        let mut credited = Vec::new();
        let mut orphaned = 0;
        for draw in &usage.draws {
            match self.repos.points().find_lot(draw.lot_id).await? {
                Some(mut lot) if !lot.is_expired_at(now) && lot.status != LotStatus::Cancelled => {
                    lot.credit(draw.amount, now);
                    credited.push(lot);
                }
                _ => orphaned += draw.amount,
            }
        }

        let adjustment = (orphaned > 0).then(|| {
            PointsLot::new(
                usage.user_id,
                orphaned,
                LotOrigin::RefundAdjustment(usage.id),
                LotStatus::Active,
                now,
                now,
                now + self.config.refund_adjustment_validity(),
            )
        });

        usage.reversed_at = Some(now);
        self.repos
            .points()
            .record_reversal(credited, adjustment, usage.clone())
            .await?;
        Ok(Some((usage, orphaned)))
    }

    // ── Earning and grants ─────────────────────────────────────

    /// Credit a pending lot for a completed reservation. Returns `None`
    /// when nothing is earned or the reservation already earned.
    pub async fn earn_for_reservation(
        &self,
        reservation_id: Uuid,
        user_id: Uuid,
        amount: i64,
        completed_at: DateTime<Utc>,
    ) -> DomainResult<Option<PointsLot>> {
        if amount <= 0 {
            return Ok(None);
        }

        let lot = self
            .serialized(user_id, move || async move {
                let existing = self
                    .repos
                    .points()
                    .find_lots_for_reservation(reservation_id)
                    .await?;
                if !existing.is_empty() {
                    return Ok(None);
                }
                let lot = PointsLot::new(
                    user_id,
                    amount,
                    LotOrigin::Reservation(reservation_id),
                    LotStatus::Pending,
                    completed_at,
                    self.earning.activates_at(completed_at),
                    self.earning.expires_at(completed_at),
                );
                self.repos.points().insert_lot(lot.clone()).await?;
                Ok(Some(lot))
            })
            .await?;

        match &lot {
            Some(lot) => {
                info!(
                    %user_id,
                    %reservation_id,
                    lot_id = %lot.id,
                    amount,
                    activates_at = %lot.activates_at,
                    "Points earned"
                );
                metrics::counter!("points_earned_total").increment(amount as u64);
                self.bus.publish(DomainEvent::PointsEarned(PointsLotEvent {
                    lot_id: lot.id,
                    user_id,
                    amount,
                    reservation_id: Some(reservation_id),
                    timestamp: completed_at,
                }));
            }
            None => debug!(%reservation_id, "Points already earned for reservation"),
        }
        Ok(lot)
    }

    /// Issue points outside the reservation flow (signup bonus, referral,
    /// admin adjustment). Granted lots are spendable immediately.
    pub async fn grant(
        &self,
        user_id: Uuid,
        amount: i64,
        origin: LotOrigin,
        now: DateTime<Utc>,
    ) -> DomainResult<PointsLot> {
        if amount <= 0 {
            return Err(DomainError::Validation(
                "granted points must be positive".to_string(),
            ));
        }
        if matches!(origin, LotOrigin::Reservation(_)) {
            return Err(DomainError::Validation(
                "reservation points are earned on completion, not granted".to_string(),
            ));
        }

        let lot = PointsLot::new(
            user_id,
            amount,
            origin,
            LotStatus::Active,
            now,
            now,
            now + self.earning.validity,
        );
        let stored = lot.clone();
        self.serialized(user_id, move || self.repos.points().insert_lot(stored.clone()))
            .await?;

        info!(%user_id, lot_id = %lot.id, amount, origin = origin.kind(), "Points granted");
        Ok(lot)
    }

    /// Cancel lots a reservation earned that are still on hold.
    pub async fn void_pending_for_reservation(
        &self,
        reservation_id: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<usize> {
        let lots = self
            .repos
            .points()
            .find_lots_for_reservation(reservation_id)
            .await?;

        let mut voided = 0;
        for lot in lots.iter().filter(|l| l.status == LotStatus::Pending) {
            if self
                .repos
                .points()
                .transition_lot(lot.id, LotStatus::Pending, LotStatus::Cancelled, now)
                .await?
            {
                voided += 1;
            }
        }
        if voided > 0 {
            info!(%reservation_id, voided, "Pending points voided");
        }
        Ok(voided)
    }

    /// Re-run the points side effects of a cancelled or no-show
    /// reservation. Used when the event handler failed after the status
    /// change committed. Returns the number of points given back.
    pub async fn reconcile_cancelled(
        &self,
        reservation_id: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<i64> {
        let reservation = self
            .repos
            .reservations()
            .find_by_id(reservation_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Reservation", "id", reservation_id))?;

        let restored = if reservation.status.is_cancelled() {
            match reservation.points_usage_id {
                Some(usage_id) => self.restore_usage(usage_id, now).await?,
                None => 0,
            }
        } else if reservation.status == ReservationStatus::NoShow {
            0
        } else {
            return Err(DomainError::Validation(format!(
                "reservation {reservation_id} is {}, not cancelled",
                reservation.status
            )));
        };
        let voided = self
            .void_pending_for_reservation(reservation_id, now)
            .await?;

        info!(%reservation_id, restored, voided, "Reservation points reconciled");
        Ok(restored)
    }

    // ── Lot lifecycle ──────────────────────────────────────────

    /// Promote pending lots whose hold has ended.
    pub async fn activate_due_lots(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let ids = self
            .repos
            .points()
            .find_lot_ids_due_for_activation(now)
            .await?;

        let mut activated = 0;
        for id in ids {
            if !self
                .repos
                .points()
                .transition_lot(id, LotStatus::Pending, LotStatus::Active, now)
                .await?
            {
                continue;
            }
            activated += 1;
            if let Some(lot) = self.repos.points().find_lot(id).await? {
                self.bus.publish(DomainEvent::PointsActivated(PointsLotEvent {
                    lot_id: lot.id,
                    user_id: lot.user_id,
                    amount: lot.remaining,
                    reservation_id: reservation_of(&lot),
                    timestamp: now,
                }));
            }
        }
        Ok(activated)
    }

    /// Expire pending or active lots past their expiry.
    pub async fn expire_due_lots(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let due = self.repos.points().find_lots_due_for_expiry(now).await?;

        let mut expired = 0;
        for lot in due {
            if !self
                .repos
                .points()
                .transition_lot(lot.id, lot.status, LotStatus::Expired, now)
                .await?
            {
                debug!(lot_id = %lot.id, "Lot changed before expiry, skipping");
                continue;
            }
            expired += 1;
            metrics::counter!("points_expired_total").increment(lot.remaining.max(0) as u64);
            self.bus.publish(DomainEvent::PointsExpired(PointsLotEvent {
                lot_id: lot.id,
                user_id: lot.user_id,
                amount: lot.remaining,
                reservation_id: reservation_of(&lot),
                timestamp: now,
            }));
        }
        Ok(expired)
    }

    // ── Queries ────────────────────────────────────────────────

    pub async fn balance(&self, user_id: Uuid, now: DateTime<Utc>) -> DomainResult<PointsBalance> {
        let lots = self.repos.points().find_lots_for_user(user_id).await?;
        let horizon = now + self.config.expiring_soon_window();

        let mut balance = PointsBalance::default();
        for lot in &lots {
            if lot.is_spendable_at(now) {
                balance.available += lot.remaining;
                if lot.expires_at <= horizon {
                    balance.expiring_soon += lot.remaining;
                }
            } else if lot.status == LotStatus::Pending && !lot.is_expired_at(now) {
                balance.pending += lot.remaining;
            }
        }
        Ok(balance)
    }

    pub async fn lots_for_user(&self, user_id: Uuid) -> DomainResult<Vec<PointsLot>> {
        self.repos.points().find_lots_for_user(user_id).await
    }

    // ── Internals ──────────────────────────────────────────────

    /// Run `op` under the user's lock, retrying lost version races.
    async fn serialized<T, F, Fut>(&self, user_id: Uuid, mut op: F) -> DomainResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        let Some(_guard) = self.user_locks.lock(user_id, self.lock_timeout).await else {
            return Err(DomainError::LockTimeout {
                key: user_lock_key(user_id),
                waited_ms: self.lock_timeout.as_millis() as u64,
            });
        };

        let mut attempt = 1;
        loop {
            match op().await {
                Err(DomainError::ConcurrentModification { entity, id })
                    if attempt < MAX_VERSION_RETRIES =>
                {
                    warn!(%user_id, entity, %id, attempt, "Ledger write lost a version race, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

fn user_lock_key(user_id: Uuid) -> i64 {
    user_id.as_u64_pair().0 as i64
}

fn reservation_of(lot: &PointsLot) -> Option<Uuid> {
    match lot.origin {
        LotOrigin::Reservation(id) => Some(id),
        _ => None,
    }
}

#[async_trait]
impl DomainEventHandler for PointsLedger {
    fn name(&self) -> &'static str {
        "points_ledger"
    }

    async fn handle(&self, event: &DomainEvent) -> DomainResult<()> {
        match event {
            DomainEvent::ReservationCompleted(e) => {
                self.earn_for_reservation(e.reservation_id, e.customer_id, e.points_earned, e.timestamp)
                    .await?;
            }
            DomainEvent::ReservationCancelled(e) => {
                let now = self.clock.now();
                if let Some(usage_id) = e.points_usage_id {
                    self.restore_usage(usage_id, now).await?;
                }
                self.void_pending_for_reservation(e.reservation_id, now)
                    .await?;
            }
            DomainEvent::ReservationNoShow(e) => {
                // Points spent on a no-show stay spent.
                self.void_pending_for_reservation(e.reservation_id, self.clock.now())
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::create_event_bus;
    use crate::domain::events::ReservationCancelledEvent;
    use crate::domain::{Actor, CancellationReason, DepositStatus, Reservation, StateTransition};
    use crate::infrastructure::storage::InMemoryRepositoryProvider;
    use crate::shared::clock::ManualClock;
    use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn ledger(clock: ManualClock) -> (PointsLedger, Arc<InMemoryRepositoryProvider>) {
        let repos = Arc::new(InMemoryRepositoryProvider::new());
        let ledger = PointsLedger::new(
            repos.clone(),
            create_event_bus(),
            Arc::new(clock),
            PointsConfig::default(),
            Duration::from_secs(1),
        );
        (ledger, repos)
    }

    #[tokio::test]
    async fn spend_then_restore_round_trips_the_balance() {
        let (ledger, _) = ledger(ManualClock::new(t0()));
        let user = Uuid::new_v4();
        ledger.grant(user, 300, LotOrigin::SignupBonus, t0()).await.unwrap();
        ledger
            .grant(user, 200, LotOrigin::AdminAdjustment, t0() + ChronoDuration::hours(1))
            .await
            .unwrap();

        let now = t0() + ChronoDuration::days(1);
        let before = ledger.balance(user, now).await.unwrap();
        let usage = ledger.use_points(user, 400, None, now).await.unwrap();
        assert_eq!(usage.draws.len(), 2);
        assert_eq!(ledger.balance(user, now).await.unwrap().available, 100);

        assert_eq!(ledger.restore_usage(usage.id, now).await.unwrap(), 400);
        assert_eq!(ledger.balance(user, now).await.unwrap(), before);

        // second reversal is a no-op
        assert_eq!(ledger.restore_usage(usage.id, now).await.unwrap(), 0);
        assert_eq!(ledger.balance(user, now).await.unwrap(), before);
    }

    #[tokio::test]
    async fn insufficient_points_touch_nothing() {
        let (ledger, _) = ledger(ManualClock::new(t0()));
        let user = Uuid::new_v4();
        ledger.grant(user, 100, LotOrigin::SignupBonus, t0()).await.unwrap();

        let err = ledger.use_points(user, 150, None, t0()).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::InsufficientPoints {
                requested: 150,
                available: 100
            }
        ));
        let lots = ledger.lots_for_user(user).await.unwrap();
        assert_eq!(lots[0].remaining, 100);
        assert_eq!(lots[0].version, 0);
    }

    #[tokio::test]
    async fn restore_into_expired_lot_creates_adjustment() {
        let (ledger, _) = ledger(ManualClock::new(t0()));
        let user = Uuid::new_v4();
        let lot = ledger.grant(user, 100, LotOrigin::SignupBonus, t0()).await.unwrap();
        let usage = ledger.use_points(user, 60, None, t0()).await.unwrap();

        let later = lot.expires_at + ChronoDuration::days(1);
        ledger.expire_due_lots(later).await.unwrap();
        ledger.restore_usage(usage.id, later).await.unwrap();

        let lots = ledger.lots_for_user(user).await.unwrap();
        let adjustment = lots
            .iter()
            .find(|l| l.origin == LotOrigin::RefundAdjustment(usage.id))
            .unwrap();
        assert_eq!(adjustment.amount, 60);
        assert_eq!(adjustment.status, LotStatus::Active);
        assert_eq!(adjustment.expires_at, later + ChronoDuration::days(30));

        let original = lots.iter().find(|l| l.id == lot.id).unwrap();
        assert_eq!(original.status, LotStatus::Expired);
        assert_eq!(original.remaining, 40);
        assert_eq!(ledger.balance(user, later).await.unwrap().available, 60);
    }

    #[tokio::test]
    async fn earning_is_pending_then_active_and_idempotent() {
        let (ledger, _) = ledger(ManualClock::new(t0()));
        let user = Uuid::new_v4();
        let reservation = Uuid::new_v4();

        let lot = ledger
            .earn_for_reservation(reservation, user, 1_200, t0())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lot.status, LotStatus::Pending);
        assert!(ledger
            .earn_for_reservation(reservation, user, 1_200, t0())
            .await
            .unwrap()
            .is_none());

        let balance = ledger.balance(user, t0()).await.unwrap();
        assert_eq!((balance.available, balance.pending), (0, 1_200));

        let week_later = t0() + ChronoDuration::days(7);
        assert_eq!(ledger.activate_due_lots(week_later).await.unwrap(), 1);
        assert_eq!(ledger.activate_due_lots(week_later).await.unwrap(), 0);
        let balance = ledger.balance(user, week_later).await.unwrap();
        assert_eq!((balance.available, balance.pending), (1_200, 0));
    }

    #[tokio::test]
    async fn expiring_soon_reports_lots_inside_the_window() {
        let (ledger, _) = ledger(ManualClock::new(t0()));
        let user = Uuid::new_v4();
        ledger.grant(user, 100, LotOrigin::SignupBonus, t0()).await.unwrap();

        let near_expiry = t0() + ChronoDuration::days(350);
        let balance = ledger.balance(user, near_expiry).await.unwrap();
        assert_eq!(balance.available, 100);
        assert_eq!(balance.expiring_soon, 100);
        assert_eq!(ledger.balance(user, t0()).await.unwrap().expiring_soon, 0);
    }

    #[tokio::test]
    async fn cancellation_event_restores_spend() {
        let (ledger, _) = ledger(ManualClock::new(t0()));
        let user = Uuid::new_v4();
        let reservation = Uuid::new_v4();
        ledger.grant(user, 500, LotOrigin::SignupBonus, t0()).await.unwrap();
        let usage = ledger
            .use_points(user, 500, Some(reservation), t0())
            .await
            .unwrap();

        ledger
            .handle(&DomainEvent::ReservationCancelled(ReservationCancelledEvent {
                reservation_id: reservation,
                shop_id: Uuid::new_v4(),
                customer_id: user,
                actor: Actor::Customer,
                reason: CancellationReason::CustomerRequest,
                deposit_status: DepositStatus::NotRequired,
                refund_amount: 0,
                points_usage_id: Some(usage.id),
                timestamp: t0(),
            }))
            .await
            .unwrap();

        assert_eq!(ledger.balance(user, t0()).await.unwrap().available, 500);
    }

    fn cancelled_booking(customer: Uuid, usage_id: Uuid, points_used: i64) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            shop_id: Uuid::new_v4(),
            customer_id: customer,
            service_ids: vec![Uuid::new_v4()],
            reservation_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            reservation_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            duration_minutes: 60,
            status: ReservationStatus::CancelledByUser,
            total_amount: 30_000,
            deposit_amount: 0,
            deposit_status: DepositStatus::NotRequired,
            remaining_amount: 30_000 - points_used,
            points_used,
            points_usage_id: Some(usage_id),
            points_earned: 0,
            special_requests: None,
            cancellation_reason: Some(CancellationReason::CustomerRequest),
            requested_at: t0(),
            confirmed_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: Some(t0()),
            no_show_at: None,
            review_deadline: None,
            version: 2,
            created_at: t0(),
            updated_at: t0(),
        }
    }

    #[tokio::test]
    async fn reconcile_restores_spend_missed_by_the_handler() {
        let (ledger, repos) = ledger(ManualClock::new(t0()));
        let user = Uuid::new_v4();
        ledger.grant(user, 500, LotOrigin::SignupBonus, t0()).await.unwrap();
        let usage = ledger.use_points(user, 300, None, t0()).await.unwrap();

        // Cancelled without the ledger ever seeing the event.
        let booking = cancelled_booking(user, usage.id, 300);
        let created = StateTransition::new(
            booking.id,
            None,
            booking.status,
            Actor::Customer,
            None,
            serde_json::Value::Null,
            t0(),
        );
        repos
            .reservations()
            .insert(booking.clone(), created)
            .await
            .unwrap();
        assert_eq!(ledger.balance(user, t0()).await.unwrap().available, 200);

        assert_eq!(ledger.reconcile_cancelled(booking.id, t0()).await.unwrap(), 300);
        assert_eq!(ledger.balance(user, t0()).await.unwrap().available, 500);

        // running it again changes nothing
        assert_eq!(ledger.reconcile_cancelled(booking.id, t0()).await.unwrap(), 0);
        assert_eq!(ledger.balance(user, t0()).await.unwrap().available, 500);
    }

    #[tokio::test]
    async fn reconcile_rejects_live_and_unknown_reservations() {
        let (ledger, repos) = ledger(ManualClock::new(t0()));
        let user = Uuid::new_v4();
        ledger.grant(user, 100, LotOrigin::SignupBonus, t0()).await.unwrap();
        let usage = ledger.use_points(user, 100, None, t0()).await.unwrap();

        let mut booking = cancelled_booking(user, usage.id, 100);
        booking.status = ReservationStatus::Confirmed;
        booking.cancellation_reason = None;
        booking.cancelled_at = None;
        let created = StateTransition::new(
            booking.id,
            None,
            booking.status,
            Actor::Shop,
            None,
            serde_json::Value::Null,
            t0(),
        );
        repos
            .reservations()
            .insert(booking.clone(), created)
            .await
            .unwrap();

        assert!(matches!(
            ledger.reconcile_cancelled(booking.id, t0()).await,
            Err(DomainError::Validation(_))
        ));
        assert_eq!(ledger.balance(user, t0()).await.unwrap().available, 0);
        assert!(matches!(
            ledger.reconcile_cancelled(Uuid::new_v4(), t0()).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn grants_must_be_positive_and_not_reservation_earnings() {
        let (ledger, _) = ledger(ManualClock::new(t0()));
        let user = Uuid::new_v4();
        assert!(ledger.grant(user, 0, LotOrigin::SignupBonus, t0()).await.is_err());
        assert!(ledger
            .grant(user, 10, LotOrigin::Reservation(Uuid::new_v4()), t0())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn concurrent_spends_never_overdraw() {
        let (ledger, _) = ledger(ManualClock::new(t0()));
        let ledger = Arc::new(ledger);
        let user = Uuid::new_v4();
        ledger.grant(user, 1_000, LotOrigin::SignupBonus, t0()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.use_points(user, 300, None, t0()).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 3);
        assert_eq!(ledger.balance(user, t0()).await.unwrap().available, 100);
    }
}
