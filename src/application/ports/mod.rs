//! Application ports (hexagonal architecture boundaries)
//!
//! Repository ports live in `domain`; the outbound collaborators the
//! application calls after a commit live here.

pub mod outbound;

pub use outbound::{
    spawn_notification_forwarder, CaptureStatus, DeferredPaymentGateway, GatewayError,
    LogNotificationSink, NotificationSink, PaymentGateway, PaymentOutcome,
};
