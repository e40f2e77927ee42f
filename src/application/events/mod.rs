//! Domain event distribution
//!
//! Two paths leave a committed transition:
//! - [`EventDispatcher`] runs the registered [`DomainEventHandler`]s in
//!   order (the points ledger), then
//! - publishes to the broadcast [`EventBus`] for fire-and-forget
//!   consumers (notifications).

pub mod event_bus;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

pub use event_bus::{create_event_bus, EventBus, EventMessage, EventSubscriber, SharedEventBus};

use crate::domain::{DomainEvent, DomainResult};

/// Synchronous consumer of committed domain events.
///
/// Handlers must be idempotent. A failed dispatch is not retried; the
/// points side of a cancellation is redone by
/// `PointsLedger::reconcile_cancelled` (`booking-service --reconcile`).
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &DomainEvent) -> DomainResult<()>;
}

#[derive(Clone)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn DomainEventHandler>>,
    bus: SharedEventBus,
}

impl EventDispatcher {
    pub fn new(bus: SharedEventBus) -> Self {
        Self {
            handlers: Vec::new(),
            bus,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn DomainEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    /// Deliver to every handler, then broadcast. A failing handler is
    /// logged and counted; it neither stops the other handlers nor undoes
    /// the already-committed transition.
    pub async fn dispatch(&self, event: DomainEvent) {
        for handler in &self.handlers {
            if let Err(e) = handler.handle(&event).await {
                error!(
                    handler = handler.name(),
                    event_type = event.event_type(),
                    reservation_id = ?event.reservation_id(),
                    error = %e,
                    "Domain event handler failed; ledger may need reconciliation"
                );
                metrics::counter!(
                    "booking_event_handler_failures_total",
                    "handler" => handler.name(),
                    "event" => event.event_type()
                )
                .increment(1);
            }
        }
        self.bus.publish(event);
    }
}
