//! Pure state logic for the volume monitor.
//!
//! This module contains the functional core: attachment classification, the
//! transition filter, and the tracker state machine. All I/O (provider calls,
//! logging of events, metrics) is handled by the poll loop.

pub mod classify;
pub mod tracker;
pub mod transitions;

pub use classify::{classify_attachment, transitioning_volumes};
pub use tracker::{
    EvictionReason, PollInstant, SharedTracker, TrackedVolume, TrackerEvent, TrackerPolicy,
    TrackerSummary, TrackerTable, VolumeRef,
};
pub use transitions::{TransitionState, next_state};
