//! Reservation aggregate
//!
//! Contains the Reservation entity, the lifecycle allow-list, the audit
//! record, and the repository interface.

pub mod model;
pub mod repository;
pub mod transition;

pub use model::{
    remaining_amount, Actor, CancellationReason, DepositStatus, Reservation, ReservationStatus,
};
pub use repository::ReservationRepository;
pub use transition::StateTransition;
