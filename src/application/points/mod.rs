//! Points ledger service

mod ledger;

pub use ledger::PointsLedger;
