pub mod booking;
pub mod events;
pub mod points;
pub mod ports;
pub mod services;

// Re-export key types for convenience
pub use booking::{
    BookingOrchestrator, ConflictDetector, ConflictResult, CreateReservationRequest,
    ReservationStateMachine, SlotKey, SlotLockManager, TransitionContext,
};
pub use events::{
    create_event_bus, DomainEventHandler, EventBus, EventDispatcher, EventMessage,
    EventSubscriber, SharedEventBus,
};
pub use points::PointsLedger;
pub use ports::{
    DeferredPaymentGateway, LogNotificationSink, NotificationSink, PaymentGateway, PaymentOutcome,
};
pub use services::{LotSweeper, NoShowScheduler, SweepReport};
