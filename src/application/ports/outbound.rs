//! Outbound ports: collaborators the engine calls but does not own
//!
//! [`PaymentGateway`] settles deposits; [`NotificationSink`] delivers
//! customer/shop notifications. Both are reached only after a transition
//! has committed and outside any slot lock.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::events::{EventMessage, SharedEventBus};
use crate::shared::shutdown::ShutdownSignal;

// ── Payment gateway ────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Network hiccup or provider 5xx; worth retrying
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// Card declined, limit exceeded; retrying will not help
    #[error("payment declined: {0}")]
    Declined(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

/// How the gateway answered a capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// Money is held; the reservation can be confirmed now
    Captured,
    /// Accepted for processing; the outcome arrives by webhook
    Deferred,
}

/// Result of a capture as reported back to the orchestrator, either
/// directly or via webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Captured,
    Failed { reason: String },
}

impl fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentOutcome::Captured => write!(f, "captured"),
            PaymentOutcome::Failed { reason } => write!(f, "failed ({reason})"),
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn capture_deposit(
        &self,
        reservation_id: Uuid,
        amount: i64,
    ) -> Result<CaptureStatus, GatewayError>;

    async fn refund(&self, reservation_id: Uuid, amount: i64) -> Result<(), GatewayError>;
}

/// Gateway used when no provider is wired in: captures are accepted and
/// settled later through the payment webhook, refunds are logged for
/// manual processing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeferredPaymentGateway;

#[async_trait]
impl PaymentGateway for DeferredPaymentGateway {
    async fn capture_deposit(
        &self,
        reservation_id: Uuid,
        amount: i64,
    ) -> Result<CaptureStatus, GatewayError> {
        info!(%reservation_id, amount, "Deposit capture requested, awaiting webhook");
        Ok(CaptureStatus::Deferred)
    }

    async fn refund(&self, reservation_id: Uuid, amount: i64) -> Result<(), GatewayError> {
        info!(%reservation_id, amount, "Deposit refund queued for manual processing");
        Ok(())
    }
}

// ── Notifications ──────────────────────────────────────────────

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, message: &EventMessage) -> Result<(), String>;
}

/// Writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, message: &EventMessage) -> Result<(), String> {
        let payload = serde_json::to_string(&message.event).map_err(|e| e.to_string())?;
        info!(
            event_id = %message.id,
            event_type = message.event.event_type(),
            payload = %payload,
            "Notification"
        );
        Ok(())
    }
}

/// Relay bus events to `sink` until shutdown. Delivery failures are logged
/// and dropped.
pub fn spawn_notification_forwarder(
    bus: SharedEventBus,
    sink: Arc<dyn NotificationSink>,
    shutdown: ShutdownSignal,
) -> tokio::task::JoinHandle<()> {
    let mut subscriber = bus.subscribe();
    tokio::spawn(async move {
        info!("Notification forwarder started");
        loop {
            tokio::select! {
                msg = subscriber.recv() => {
                    let Some(msg) = msg else { break };
                    if let Err(e) = sink.notify(&msg).await {
                        warn!(event_id = %msg.id, event_type = msg.event.event_type(), error = %e, "Notification delivery failed");
                        metrics::counter!("booking_notification_failures_total").increment(1);
                    } else {
                        debug!(event_id = %msg.id, "Notification delivered");
                    }
                }
                _ = shutdown.notified().wait() => {
                    break;
                }
            }
        }
        info!("Notification forwarder stopped");
    })
}
