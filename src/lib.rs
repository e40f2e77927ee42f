//! # Beauty Booking Engine
//!
//! Reservation core for a beauty-service marketplace: slot locking,
//! capacity and overlap checks, the reservation lifecycle, automatic
//! no-show handling and a FIFO points ledger.
//!
//! ## Architecture
//!
//! - **domain**: Reservations, shops, points lots, events and repository traits
//! - **application**: Slot locks, conflict detection, state machine,
//!   orchestrator, points ledger and background sweeps
//! - **infrastructure**: SeaORM storage (SQLite) and the in-memory store
//! - **server**: Runtime assembly shared by the CLI and tests
//! - **shared**: Errors, clock, shutdown and retry helpers

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig};

// Re-export database types for easy access
pub use infrastructure::{
    init_database, run_migrations, DatabaseConfig, InMemoryRepositoryProvider,
    SeaOrmRepositoryProvider,
};

// Re-export the runtime entry points
pub use server::{BookingEngine, ServerHandle, ServerOptions};

pub use application::{create_event_bus, EventBus, SharedEventBus};
