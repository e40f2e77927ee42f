//! Integration tests against SQLite through the SeaORM repositories
//!
//! Same engine assembly as the service binary, over a migrated database.

mod common;

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use beauty_booking::application::{PaymentOutcome, TransitionContext};
use beauty_booking::config::AppConfig;
use beauty_booking::domain::{
    Actor, DomainError, LotOrigin, RepositoryProvider, ReservationStatus, Shop, ShopService,
};
use beauty_booking::shared::clock::{Clock, ManualClock};
use beauty_booking::{
    init_database, run_migrations, BookingEngine, DatabaseConfig, SeaOrmRepositoryProvider,
};
use common::{at, local, slot_date, RecordingGateway};

struct SqliteFixture {
    engine: BookingEngine,
    repos: Arc<SeaOrmRepositoryProvider>,
    clock: Arc<ManualClock>,
    shop: Shop,
    cut: ShopService,
    nails: ShopService,
}

async fn seeded(config: DatabaseConfig, slot_capacity: i32) -> SqliteFixture {
    let db = init_database(&config).await.unwrap();
    run_migrations(&db).await.unwrap();
    let repos = Arc::new(SeaOrmRepositoryProvider::new(db));

    let shop = Shop {
        id: Uuid::new_v4(),
        name: "Yeonnam Nail Studio".to_string(),
        slot_capacity,
        slot_interval_minutes: 30,
        opening_time: at(10, 0),
        closing_time: at(20, 0),
        auto_confirm: true,
        is_active: true,
    };
    let cut = ShopService {
        id: Uuid::new_v4(),
        shop_id: shop.id,
        name: "Haircut".to_string(),
        duration_minutes: 60,
        price: 30_000,
        deposit_amount: 0,
        exclusive: false,
        is_active: true,
    };
    let nails = ShopService {
        id: Uuid::new_v4(),
        name: "Gel nails".to_string(),
        duration_minutes: 90,
        price: 50_000,
        deposit_amount: 10_000,
        ..cut.clone()
    };
    repos.shop_store().save_shop(&shop).await.unwrap();
    repos.shop_store().save_service(&cut).await.unwrap();
    repos.shop_store().save_service(&nails).await.unwrap();

    let clock = Arc::new(ManualClock::new(local(9, 0) - Duration::days(1)));
    let engine = BookingEngine::assemble(
        repos.clone(),
        clock.clone(),
        Arc::new(RecordingGateway::default()),
        &AppConfig::default(),
    );

    SqliteFixture {
        engine,
        repos,
        clock,
        shop,
        cut,
        nails,
    }
}

impl SqliteFixture {
    fn request(
        &self,
        service: &ShopService,
        h: u32,
        m: u32,
    ) -> beauty_booking::application::CreateReservationRequest {
        beauty_booking::application::CreateReservationRequest {
            shop_id: self.shop.id,
            customer_id: Uuid::new_v4(),
            service_ids: vec![service.id],
            reservation_date: slot_date(),
            reservation_time: at(h, m),
            points_to_use: 0,
            special_requests: Some("window seat please".to_string()),
        }
    }
}

#[tokio::test]
async fn reservation_round_trips_through_sqlite() {
    let fx = seeded(DatabaseConfig::sqlite_in_memory(), 1).await;
    let orchestrator = &fx.engine.orchestrator;

    let created = orchestrator
        .create_reservation(fx.request(&fx.nails, 14, 0))
        .await
        .unwrap();
    let loaded = orchestrator.get_reservation(created.id).await.unwrap();
    assert_eq!(loaded.id, created.id);
    assert_eq!(loaded.status, ReservationStatus::Requested);
    assert_eq!(loaded.reservation_date, slot_date());
    assert_eq!(loaded.reservation_time, at(14, 0));
    assert_eq!(loaded.deposit_amount, 10_000);
    assert_eq!(loaded.version, created.version);
    assert_eq!(loaded.service_ids, vec![fx.nails.id]);
    assert_eq!(loaded.special_requests.as_deref(), Some("window seat please"));

    let err = orchestrator
        .create_reservation(fx.request(&fx.cut, 14, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::SlotUnavailable { .. }));

    let mine = orchestrator
        .reservations_for_customer(created.customer_id)
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
}

#[tokio::test]
async fn stale_version_is_rejected() {
    let fx = seeded(DatabaseConfig::sqlite_in_memory(), 1).await;
    let created = fx
        .engine
        .orchestrator
        .create_reservation(fx.request(&fx.cut, 11, 0))
        .await
        .unwrap();

    let now = fx.clock.now();
    let (next, audit) = fx
        .engine
        .state_machine
        .prepare(
            &created,
            ReservationStatus::CancelledByUser,
            Actor::Customer,
            &TransitionContext::new(),
            now,
        )
        .unwrap();

    fx.repos
        .reservations()
        .apply_transition(next.clone(), created.version, audit.clone())
        .await
        .unwrap();

    // Same expected version a second time: someone already moved it.
    let err = fx
        .repos
        .reservations()
        .apply_transition(next, created.version, audit)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ConcurrentModification { .. }));

    let stored = fx.engine.orchestrator.get_reservation(created.id).await.unwrap();
    assert_eq!(stored.version, created.version + 1);
    assert_eq!(stored.status, ReservationStatus::CancelledByUser);
    assert_eq!(
        fx.engine
            .orchestrator
            .reservation_history(created.id)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn audit_trail_is_ordered_and_complete() {
    let fx = seeded(DatabaseConfig::sqlite_in_memory(), 1).await;
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.nails, 14, 0))
        .await
        .unwrap();
    orchestrator
        .handle_payment_result(r.id, PaymentOutcome::Captured)
        .await
        .unwrap();

    fx.clock.set(local(14, 20));
    let (report, _) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(report.transitioned, 1);

    let history = orchestrator.reservation_history(r.id).await.unwrap();
    let path: Vec<_> = history
        .iter()
        .map(|t| (t.from_status, t.to_status))
        .collect();
    assert_eq!(
        path,
        vec![
            (None, ReservationStatus::Requested),
            (
                Some(ReservationStatus::Requested),
                ReservationStatus::Confirmed
            ),
            (
                Some(ReservationStatus::Confirmed),
                ReservationStatus::NoShow
            ),
        ]
    );
    assert_eq!(history[2].metadata["deposit_status"], "forfeited");
}

#[tokio::test]
async fn points_spend_and_reversal_persist() {
    let fx = seeded(DatabaseConfig::sqlite_in_memory(), 1).await;
    let ledger = &fx.engine.ledger;
    let user = Uuid::new_v4();

    ledger
        .grant(user, 700, LotOrigin::SignupBonus, fx.clock.now())
        .await
        .unwrap();
    fx.clock.advance(Duration::minutes(1));
    ledger
        .grant(user, 700, LotOrigin::Referral(None), fx.clock.now())
        .await
        .unwrap();

    let mut req = fx.request(&fx.cut, 15, 0);
    req.customer_id = user;
    req.points_to_use = 1_000;
    let r = fx.engine.orchestrator.create_reservation(req).await.unwrap();

    let usage_id = r.points_usage_id.unwrap();
    let usage = fx.repos.points().find_usage(usage_id).await.unwrap().unwrap();
    assert_eq!(usage.amount, 1_000);
    assert_eq!(usage.draws.len(), 2);
    assert_eq!(usage.draws[0].amount, 700);
    assert_eq!(usage.draws[1].amount, 300);
    assert!(usage.reversed_at.is_none());

    fx.engine
        .orchestrator
        .cancel_reservation(r.id, Actor::Customer, None)
        .await
        .unwrap();

    let usage = fx.repos.points().find_usage(usage_id).await.unwrap().unwrap();
    assert!(usage.reversed_at.is_some());
    let balance = ledger.balance(user, fx.clock.now()).await.unwrap();
    assert_eq!(balance.available, 1_400);

    // A second reversal is refused at the storage layer too.
    assert_eq!(ledger.restore_usage(usage_id, fx.clock.now()).await.unwrap(), 0);
}

#[tokio::test]
async fn earned_lot_activates_through_sqlite_sweep() {
    let fx = seeded(DatabaseConfig::sqlite_in_memory(), 1).await;
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.cut, 10, 0))
        .await
        .unwrap();
    fx.clock.set(local(11, 0));
    orchestrator
        .complete_reservation(r.id, Actor::Shop)
        .await
        .unwrap();

    let lots = fx.engine.ledger.lots_for_user(r.customer_id).await.unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].remaining, 750);

    fx.clock.advance(Duration::days(7));
    let (_, lot_report) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(lot_report.activated, 1);

    // Activation is a compare-and-set; a second sweep does nothing.
    let (_, lot_report) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(lot_report.activated, 0);

    let balance = fx
        .engine
        .ledger
        .balance(r.customer_id, fx.clock.now())
        .await
        .unwrap();
    assert_eq!(balance.available, 750);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_bookings_over_sqlite_admit_one() {
    let fx = Arc::new(seeded(DatabaseConfig::sqlite_in_memory(), 1).await);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let fx = fx.clone();
            tokio::spawn(async move {
                fx.engine
                    .orchestrator
                    .create_reservation(fx.request(&fx.cut, 17, 0))
                    .await
            })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(e) => assert!(matches!(e, DomainError::SlotUnavailable { .. }), "{e}"),
        }
    }
    assert_eq!(admitted, 1);

    let stored = fx
        .repos
        .reservations()
        .find_active_for_shop_on_date(fx.shop.id, slot_date())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn data_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("booking.db");
    let config = DatabaseConfig::sqlite(path.to_str().unwrap());

    let fx = seeded(config.clone(), 1).await;
    let created = fx
        .engine
        .orchestrator
        .create_reservation(fx.request(&fx.cut, 12, 0))
        .await
        .unwrap();
    drop(fx);

    let db = init_database(&config).await.unwrap();
    // Re-running migrations on an up-to-date schema is a no-op.
    run_migrations(&db).await.unwrap();
    let repos = SeaOrmRepositoryProvider::new(db);
    let reloaded = repos
        .reservations()
        .find_by_id(created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status, ReservationStatus::Confirmed);
    assert_eq!(reloaded.version, created.version);
}
