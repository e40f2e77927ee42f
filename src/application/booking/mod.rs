//! Booking flow: slot locking, conflict detection, lifecycle and the
//! orchestrator tying them together.

pub mod conflict;
pub mod orchestrator;
pub mod slot_lock;
pub mod state_machine;

pub use conflict::{ConflictDetector, ConflictResult};
pub use orchestrator::{BookingOrchestrator, CreateReservationRequest};
pub use slot_lock::{KeyedMutex, SlotKey, SlotLockManager};
pub use state_machine::{refund_amount, ReservationStateMachine, TransitionContext};
