//! Background services

mod lot_sweep;
mod no_show_sweep;

pub use lot_sweep::{LotSweepReport, LotSweeper};
pub use no_show_sweep::{NoShowScheduler, SweepReport};
