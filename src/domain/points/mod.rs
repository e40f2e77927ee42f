//! Points ledger aggregate
//!
//! Lots, usage records, earning/spending policy and the repository
//! interface.

pub mod model;
pub mod policy;
pub mod repository;

pub use model::{LotOrigin, LotStatus, PointsBalance, PointsLot, PointsUsage, UsageDraw};
pub use policy::{fifo_order, plan_draws, EarningPolicy};
pub use repository::PointsRepository;
