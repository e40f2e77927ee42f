//! Integration tests for points spent on and earned by reservations

mod common;

use chrono::Duration;
use uuid::Uuid;

use beauty_booking::application::PaymentOutcome;
use beauty_booking::domain::{
    Actor, DomainError, LotOrigin, LotStatus, ReservationStatus,
};
use beauty_booking::shared::clock::Clock;
use common::{Fixture, CUT_PRICE};

async fn granted(fx: &Fixture, amounts: &[i64]) -> Uuid {
    let user = Uuid::new_v4();
    for amount in amounts {
        fx.engine
            .ledger
            .grant(user, *amount, LotOrigin::AdminAdjustment, fx.clock.now())
            .await
            .unwrap();
        // Distinct issue times keep the FIFO order deterministic.
        fx.clock.advance(Duration::minutes(1));
    }
    user
}

async fn available(fx: &Fixture, user: Uuid) -> i64 {
    fx.engine
        .ledger
        .balance(user, fx.clock.now())
        .await
        .unwrap()
        .available
}

#[tokio::test]
async fn booking_spends_oldest_lots_first() {
    let fx = Fixture::new(1);
    let user = granted(&fx, &[1_000, 500]).await;

    let mut req = fx.request(&fx.cut, 14, 0);
    req.customer_id = user;
    req.points_to_use = 1_200;
    let r = fx.engine.orchestrator.create_reservation(req).await.unwrap();
    assert_eq!(r.points_used, 1_200);
    assert_eq!(r.remaining_amount, CUT_PRICE - 1_200);
    assert!(r.points_usage_id.is_some());

    let mut lots = fx.engine.ledger.lots_for_user(user).await.unwrap();
    lots.sort_by_key(|l| l.issued_at);
    assert_eq!(lots[0].remaining, 0);
    assert_eq!(lots[1].remaining, 300);
    assert_eq!(available(&fx, user).await, 300);
}

#[tokio::test]
async fn cancellation_gives_points_back() {
    let fx = Fixture::new(1);
    let user = granted(&fx, &[1_000, 500]).await;

    let mut req = fx.request(&fx.cut, 14, 0);
    req.customer_id = user;
    req.points_to_use = 1_200;
    let r = fx.engine.orchestrator.create_reservation(req).await.unwrap();
    assert_eq!(available(&fx, user).await, 300);

    fx.engine
        .orchestrator
        .cancel_reservation(r.id, Actor::Customer, None)
        .await
        .unwrap();
    assert_eq!(available(&fx, user).await, 1_500);

    // Restoring is idempotent.
    let usage_id = r.points_usage_id.unwrap();
    let again = fx
        .engine
        .ledger
        .restore_usage(usage_id, fx.clock.now())
        .await
        .unwrap();
    assert_eq!(again, 0);
    assert_eq!(available(&fx, user).await, 1_500);
}

#[tokio::test]
async fn insufficient_points_leave_nothing_behind() {
    let fx = Fixture::new(1);
    let user = granted(&fx, &[1_000]).await;

    let mut req = fx.request(&fx.cut, 14, 0);
    req.customer_id = user;
    req.points_to_use = 5_000;
    let err = fx
        .engine
        .orchestrator
        .create_reservation(req)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::InsufficientPoints {
            requested: 5_000,
            available: 1_000
        }
    ));

    assert!(fx.store.all_reservations().is_empty());
    assert_eq!(available(&fx, user).await, 1_000);

    // The slot was not consumed by the failed attempt.
    fx.engine
        .orchestrator
        .create_reservation(fx.request(&fx.cut, 14, 0))
        .await
        .unwrap();
}

#[tokio::test]
async fn completion_earns_points_after_hold() {
    let fx = Fixture::new(1);
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.cut, 14, 0))
        .await
        .unwrap();
    fx.set_local(14, 0);
    orchestrator.start_service(r.id).await.unwrap();
    fx.set_local(15, 0);
    let done = orchestrator
        .complete_reservation(r.id, Actor::Shop)
        .await
        .unwrap();
    assert_eq!(done.status, ReservationStatus::Completed);
    // 2.5% of 30,000
    assert_eq!(done.points_earned, 750);

    let balance = fx
        .engine
        .ledger
        .balance(r.customer_id, fx.clock.now())
        .await
        .unwrap();
    assert_eq!(balance.available, 0);
    assert_eq!(balance.pending, 750);

    fx.clock.advance(Duration::days(7) - Duration::minutes(1));
    let (_, lots) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(lots.activated, 0);

    fx.clock.advance(Duration::minutes(2));
    let (_, lots) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(lots.activated, 1);
    assert_eq!(available(&fx, r.customer_id).await, 750);

    let earned = fx.engine.ledger.lots_for_user(r.customer_id).await.unwrap();
    assert_eq!(earned.len(), 1);
    assert_eq!(earned[0].origin, LotOrigin::Reservation(r.id));
    assert_eq!(earned[0].status, LotStatus::Active);
}

#[tokio::test]
async fn points_earned_only_on_what_was_paid_in_cash() {
    let fx = Fixture::new(1);
    let user = granted(&fx, &[10_000]).await;

    let mut req = fx.request(&fx.cut, 14, 0);
    req.customer_id = user;
    req.points_to_use = 10_000;
    let r = fx.engine.orchestrator.create_reservation(req).await.unwrap();

    fx.set_local(15, 0);
    let done = fx
        .engine
        .orchestrator
        .complete_reservation(r.id, Actor::Shop)
        .await
        .unwrap();
    // 2.5% of 20,000
    assert_eq!(done.points_earned, 500);
}

#[tokio::test]
async fn no_show_keeps_points_spent() {
    let fx = Fixture::new(1);
    let user = granted(&fx, &[2_000]).await;

    let mut req = fx.request(&fx.nails, 14, 0);
    req.customer_id = user;
    req.points_to_use = 1_500;
    let r = fx.engine.orchestrator.create_reservation(req).await.unwrap();
    fx.engine
        .orchestrator
        .handle_payment_result(r.id, PaymentOutcome::Captured)
        .await
        .unwrap();

    fx.set_local(14, 30);
    let (report, _) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(report.transitioned, 1);
    assert_eq!(
        fx.engine.orchestrator.get_reservation(r.id).await.unwrap().status,
        ReservationStatus::NoShow
    );
    assert_eq!(available(&fx, user).await, 500);
}

#[tokio::test]
async fn granted_points_expire_after_validity() {
    let fx = Fixture::new(1);
    let user = granted(&fx, &[800]).await;
    assert_eq!(available(&fx, user).await, 800);

    fx.clock.advance(Duration::days(366));
    let (_, lots) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(lots.expired, 1);
    assert_eq!(available(&fx, user).await, 0);

    let lots = fx.engine.ledger.lots_for_user(user).await.unwrap();
    assert_eq!(lots[0].status, LotStatus::Expired);
}
