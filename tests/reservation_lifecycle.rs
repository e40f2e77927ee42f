//! Integration tests for the reservation lifecycle
//!
//! Deposits, cancellations and refunds, the no-show sweep, and the audit
//! trail, driven through the orchestrator with a manual clock.

mod common;

use beauty_booking::application::PaymentOutcome;
use beauty_booking::domain::{
    Actor, CancellationReason, DepositStatus, DomainError, ReservationStatus,
};
use common::{eventually, Fixture, NAIL_DEPOSIT, NAIL_PRICE};

#[tokio::test]
async fn deposit_booking_waits_for_capture() {
    let fx = Fixture::new(1);
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.nails, 14, 0))
        .await
        .unwrap();
    assert_eq!(r.status, ReservationStatus::Requested);
    assert_eq!(r.deposit_status, DepositStatus::Pending);
    assert_eq!(r.deposit_amount, NAIL_DEPOSIT);
    assert_eq!(r.remaining_amount, NAIL_PRICE - NAIL_DEPOSIT);

    // The shop cannot confirm over an uncaptured deposit.
    let err = orchestrator.confirm_reservation(r.id).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let confirmed = orchestrator
        .handle_payment_result(r.id, PaymentOutcome::Captured)
        .await
        .unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert_eq!(confirmed.deposit_status, DepositStatus::Captured);
    assert!(confirmed.confirmed_at.is_some());

    // Webhook redelivery changes nothing.
    let again = orchestrator
        .handle_payment_result(r.id, PaymentOutcome::Captured)
        .await
        .unwrap();
    assert_eq!(again.version, confirmed.version);
}

/// Confirmed 14:00 booking with a captured deposit; the customer never
/// shows up.
#[tokio::test]
async fn no_show_after_grace_forfeits_deposit() {
    let fx = Fixture::new(1);
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.nails, 14, 0))
        .await
        .unwrap();
    orchestrator
        .handle_payment_result(r.id, PaymentOutcome::Captured)
        .await
        .unwrap();

    fx.set_local(14, 10);
    let (report, _) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(report.transitioned, 0);
    assert_eq!(
        orchestrator.get_reservation(r.id).await.unwrap().status,
        ReservationStatus::Confirmed
    );

    fx.set_local(14, 20);
    let (report, _) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(report.transitioned, 1);

    let r = orchestrator.get_reservation(r.id).await.unwrap();
    assert_eq!(r.status, ReservationStatus::NoShow);
    assert_eq!(r.deposit_status, DepositStatus::Forfeited);
    assert!(r.no_show_at.is_some());

    // A second pass finds nothing left to do.
    let (report, _) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(report.transitioned, 0);
    assert_eq!(report.failed, 0);

    let history = orchestrator.reservation_history(r.id).await.unwrap();
    let path: Vec<_> = history.iter().map(|t| t.to_status).collect();
    assert_eq!(
        path,
        vec![
            ReservationStatus::Requested,
            ReservationStatus::Confirmed,
            ReservationStatus::NoShow
        ]
    );
    assert_eq!(history[0].from_status, None);
    assert_eq!(history[2].from_status, Some(ReservationStatus::Confirmed));
    assert_eq!(history[2].actor, Actor::System);
    assert!(fx.gateway.refunds().is_empty());
}

#[tokio::test]
async fn failed_capture_cancels_and_late_capture_is_refunded() {
    let fx = Fixture::new(1);
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.nails, 16, 0))
        .await
        .unwrap();
    let failed = orchestrator
        .handle_payment_result(
            r.id,
            PaymentOutcome::Failed {
                reason: "card declined".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(failed.status, ReservationStatus::CancelledByShop);
    assert_eq!(
        failed.cancellation_reason,
        Some(CancellationReason::PaymentFailed)
    );
    assert_eq!(failed.deposit_status, DepositStatus::Voided);

    // The slot is free again.
    orchestrator
        .create_reservation(fx.request(&fx.cut, 16, 0))
        .await
        .unwrap();

    // The gateway changes its mind after the fact.
    let unchanged = orchestrator
        .handle_payment_result(r.id, PaymentOutcome::Captured)
        .await
        .unwrap();
    assert_eq!(unchanged.status, ReservationStatus::CancelledByShop);
    assert!(eventually(|| fx.gateway.refunds() == vec![(r.id, NAIL_DEPOSIT)]).await);
}

#[tokio::test]
async fn redelivered_late_capture_refunds_once() {
    let fx = Fixture::new(1);
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.nails, 16, 0))
        .await
        .unwrap();
    orchestrator
        .handle_payment_result(
            r.id,
            PaymentOutcome::Failed {
                reason: "card declined".into(),
            },
        )
        .await
        .unwrap();

    let first = orchestrator
        .handle_payment_result(r.id, PaymentOutcome::Captured)
        .await
        .unwrap();
    assert_eq!(first.deposit_status, DepositStatus::Refunded);
    assert_eq!(first.status, ReservationStatus::CancelledByShop);

    let second = orchestrator
        .handle_payment_result(r.id, PaymentOutcome::Captured)
        .await
        .unwrap();
    assert_eq!(second.version, first.version);

    assert!(eventually(|| !fx.gateway.refunds().is_empty()).await);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(fx.gateway.refunds(), vec![(r.id, NAIL_DEPOSIT)]);

    // The settlement is on the audit trail without a status change.
    let history = orchestrator.reservation_history(r.id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.from_status, Some(ReservationStatus::CancelledByShop));
    assert_eq!(last.to_status, ReservationStatus::CancelledByShop);
    assert_eq!(last.metadata["deposit_status"], "refunded");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_late_captures_refund_once() {
    let fx = std::sync::Arc::new(Fixture::new(1));

    let r = fx
        .engine
        .orchestrator
        .create_reservation(fx.request(&fx.nails, 16, 0))
        .await
        .unwrap();
    fx.engine
        .orchestrator
        .handle_payment_result(
            r.id,
            PaymentOutcome::Failed {
                reason: "timeout".into(),
            },
        )
        .await
        .unwrap();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let fx = fx.clone();
            tokio::spawn(async move {
                fx.engine
                    .orchestrator
                    .handle_payment_result(r.id, PaymentOutcome::Captured)
                    .await
            })
        })
        .collect();
    for handle in handles {
        let settled = handle.await.unwrap().unwrap();
        assert_eq!(settled.deposit_status, DepositStatus::Refunded);
    }

    assert!(eventually(|| !fx.gateway.refunds().is_empty()).await);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(fx.gateway.refunds().len(), 1);
}

#[tokio::test]
async fn early_customer_cancel_refunds_deposit() {
    let fx = Fixture::new(1);
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.nails, 14, 0))
        .await
        .unwrap();
    orchestrator
        .handle_payment_result(r.id, PaymentOutcome::Captured)
        .await
        .unwrap();

    // 29 hours ahead of the slot.
    let cancelled = orchestrator
        .cancel_reservation(r.id, Actor::Customer, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::CancelledByUser);
    assert_eq!(cancelled.deposit_status, DepositStatus::Refunded);
    assert_eq!(
        cancelled.cancellation_reason,
        Some(CancellationReason::CustomerRequest)
    );
    assert!(eventually(|| fx.gateway.refunds() == vec![(r.id, NAIL_DEPOSIT)]).await);
}

#[tokio::test]
async fn late_customer_cancel_forfeits_deposit() {
    let fx = Fixture::new(1);
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.nails, 14, 0))
        .await
        .unwrap();
    orchestrator
        .handle_payment_result(r.id, PaymentOutcome::Captured)
        .await
        .unwrap();

    fx.set_local(13, 0);
    let cancelled = orchestrator
        .cancel_reservation(r.id, Actor::Customer, None)
        .await
        .unwrap();
    assert_eq!(cancelled.deposit_status, DepositStatus::Forfeited);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(fx.gateway.refunds().is_empty());
}

#[tokio::test]
async fn shop_cancel_always_refunds() {
    let fx = Fixture::new(1);
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.nails, 14, 0))
        .await
        .unwrap();
    orchestrator
        .handle_payment_result(r.id, PaymentOutcome::Captured)
        .await
        .unwrap();

    fx.set_local(13, 30);
    let cancelled = orchestrator
        .cancel_reservation(r.id, Actor::Shop, Some(CancellationReason::ShopUnavailable))
        .await
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::CancelledByShop);
    assert_eq!(cancelled.deposit_status, DepositStatus::Refunded);
    assert!(eventually(|| fx.gateway.refunds().len() == 1).await);
}

#[tokio::test]
async fn unconfirmed_request_times_out_at_start() {
    let fx = Fixture::new(1);
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.nails, 11, 0))
        .await
        .unwrap();

    fx.set_local(11, 1);
    let (report, _) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(report.transitioned, 1);

    let r = orchestrator.get_reservation(r.id).await.unwrap();
    assert_eq!(r.status, ReservationStatus::CancelledByShop);
    assert_eq!(
        r.cancellation_reason,
        Some(CancellationReason::ConfirmationTimeout)
    );
    assert_eq!(r.deposit_status, DepositStatus::Voided);
}

#[tokio::test]
async fn in_progress_service_is_auto_completed() {
    let fx = Fixture::new(1);
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.cut, 10, 0))
        .await
        .unwrap();
    fx.set_local(10, 0);
    orchestrator.start_service(r.id).await.unwrap();

    // Ends 11:00; auto-complete waits two more hours.
    fx.set_local(12, 59);
    let (report, _) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(report.transitioned, 0);

    fx.set_local(13, 1);
    let (report, _) = fx.engine.sweep_once().await.unwrap();
    assert_eq!(report.transitioned, 1);

    let r = orchestrator.get_reservation(r.id).await.unwrap();
    assert_eq!(r.status, ReservationStatus::Completed);
    assert!(r.started_at.is_some());
    assert!(r.review_deadline.is_some());
}

#[tokio::test]
async fn terminal_reservations_reject_further_transitions() {
    let fx = Fixture::new(1);
    let orchestrator = &fx.engine.orchestrator;

    let r = orchestrator
        .create_reservation(fx.request(&fx.cut, 15, 0))
        .await
        .unwrap();
    orchestrator
        .cancel_reservation(r.id, Actor::Customer, None)
        .await
        .unwrap();

    let err = orchestrator
        .complete_reservation(r.id, Actor::Shop)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::InvalidStateTransition {
            from: ReservationStatus::CancelledByUser,
            to: ReservationStatus::Completed,
            ..
        }
    ));

    let err = orchestrator
        .cancel_reservation(r.id, Actor::Customer, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE_TRANSITION");

    // Rejections leave no audit rows.
    assert_eq!(orchestrator.reservation_history(r.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_locking() {
    let fx = Fixture::new(1);
    let orchestrator = &fx.engine.orchestrator;

    // Off the 30-minute grid
    let err = orchestrator
        .create_reservation(fx.request(&fx.cut, 14, 15))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    // 19:00 + 90 minutes runs past closing
    let err = orchestrator
        .create_reservation(fx.request(&fx.nails, 19, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    // Already started
    fx.set_local(14, 30);
    let err = orchestrator
        .create_reservation(fx.request(&fx.cut, 14, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    let mut req = fx.request(&fx.cut, 16, 0);
    req.shop_id = uuid::Uuid::new_v4();
    let err = orchestrator.create_reservation(req).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));

    let mut req = fx.request(&fx.cut, 16, 0);
    req.service_ids.clear();
    let err = orchestrator.create_reservation(req).await.unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));

    assert!(fx.store.all_reservations().is_empty());
}
