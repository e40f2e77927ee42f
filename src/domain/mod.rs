pub mod events;
pub mod points;
pub mod repositories;
pub mod reservation;
pub mod shop;

// Re-export commonly used types
pub use events::DomainEvent;
pub use points::{LotOrigin, LotStatus, PointsBalance, PointsLot, PointsUsage};
pub use repositories::{DomainResult, RepositoryProvider};
pub use reservation::{
    Actor, CancellationReason, DepositStatus, Reservation, ReservationStatus, StateTransition,
};
pub use shop::{Shop, ShopService};

// Re-export DomainError from shared for convenience
pub use crate::shared::errors::DomainError;
