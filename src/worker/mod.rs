//! The background poll loop.
//!
//! A single [`MonitorWorker`] owns the provider and drives the shared tracker
//! table on a fixed interval. HTTP handlers only ever read the table.
//!
//! # Module Structure
//!
//! - [`poll`]: Polling configuration and the degraded threshold
//! - `monitor`: The worker itself

mod monitor;
pub mod poll;

pub use monitor::{MonitorExit, MonitorWorker, PollError, TickReport, check_monitor_exit};
pub use poll::PollConfig;
