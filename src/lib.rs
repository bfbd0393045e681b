//! Volume Monitor - watches EBS volume attachments and flags transitions that
//! stay attaching or detaching for too long.
//!
//! This library provides the domain types, the tracker state machine, the
//! volume providers, and the poll loop and HTTP surface built on them.

pub mod config;
pub mod observability;
pub mod provider;
pub mod server;
pub mod simulation;
pub mod state;
pub mod types;
pub mod worker;

#[cfg(test)]
mod test_utils;
