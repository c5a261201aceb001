//! Unified activity/event log (spec §4.4).

pub mod filter;
pub mod log;

pub use filter::Filter;
pub use log::ActivityLog;
