//! The transition tracker: per-volume state carried across polls.
//!
//! The tracker is fed one full listing per poll via
//! [`TrackerTable::apply_listing`]. It never performs I/O; it returns the
//! transitions it made as [`TrackerEvent`]s for the caller to log and export.
//!
//! # Entry lifecycle
//!
//! - Created as `Transitioning` the first time a volume is seen attaching or
//!   detaching, with `deadline = now + stuck_tolerance`. The deadline is never
//!   changed afterwards.
//! - Advanced on every poll that lists the volume (see
//!   [`next_state`](super::transitions::next_state)).
//! - `Unstuck` entries stay visible for one more poll, then are removed. A
//!   volume that starts transitioning again gets a fresh entry and deadline.
//! - Entries whose volume disappears from the listing are removed once
//!   `missing_grace` has elapsed since they were last seen.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;

use super::classify::{classify_attachment, transitioning_volumes};
use super::transitions::{TransitionState, next_state};
use crate::types::{AttachmentState, VolumeKey, VolumeSnapshot};

/// Default time a volume may stay attaching/detaching before it is stuck.
pub const DEFAULT_STUCK_TOLERANCE_SECS: u64 = 5;

/// Default time a vanished volume is kept before eviction.
pub const DEFAULT_MISSING_GRACE_SECS: u64 = 30;

/// The tracker table shared between the poll loop (sole writer) and the
/// HTTP handlers (readers).
pub type SharedTracker = Arc<RwLock<TrackerTable>>;

/// The moment a poll is applied, on both clocks.
///
/// Deadlines use the monotonic clock; the wall clock is only recorded for
/// display.
#[derive(Debug, Clone, Copy)]
pub struct PollInstant {
    pub monotonic: Instant,
    pub wall: DateTime<Utc>,
}

impl PollInstant {
    pub fn now() -> Self {
        PollInstant {
            monotonic: Instant::now(),
            wall: Utc::now(),
        }
    }
}

/// Timing policy for the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerPolicy {
    /// How long a volume may stay attaching/detaching before it is stuck.
    pub stuck_tolerance: Duration,

    /// How long a tracked volume may be absent from listings before its
    /// entry is dropped.
    pub missing_grace: Duration,
}

impl Default for TrackerPolicy {
    fn default() -> Self {
        TrackerPolicy {
            stuck_tolerance: Duration::from_secs(DEFAULT_STUCK_TOLERANCE_SECS),
            missing_grace: Duration::from_secs(DEFAULT_MISSING_GRACE_SECS),
        }
    }
}

/// A volume's identifying labels, carried on events so that consumers do
/// not need to look the entry up again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRef {
    pub key: VolumeKey,
    pub zone: String,
    pub volume_id: String,
}

impl VolumeRef {
    fn of(snapshot: &VolumeSnapshot) -> Self {
        VolumeRef {
            key: VolumeKey::from_snapshot(snapshot),
            zone: snapshot.availability_zone.clone(),
            volume_id: snapshot.volume_id.clone(),
        }
    }
}

/// Why an entry left the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The entry was `Unstuck` and has had its extra poll of visibility.
    Resolved,

    /// The volume has not been listed for longer than the missing grace.
    Missing,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Resolved => "resolved",
            EvictionReason::Missing => "missing",
        }
    }
}

/// A state change made by [`TrackerTable::apply_listing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A volume started being tracked.
    Started {
        volume: VolumeRef,
        attachment: AttachmentState,
    },

    /// A volume was still transitioning at its deadline.
    Stuck {
        volume: VolumeRef,
        attachment: AttachmentState,
        /// How far past the deadline the poll that noticed it ran.
        overdue: Duration,
    },

    /// A tracked volume resolved to `Attached` or `Detached`.
    Unstuck {
        volume: VolumeRef,
        attachment: AttachmentState,
        /// True if the volume had been flagged stuck before resolving.
        was_stuck: bool,
    },

    /// An entry was removed from the table.
    Evicted {
        volume: VolumeRef,
        last_state: TransitionState,
        reason: EvictionReason,
    },
}

impl TrackerEvent {
    pub fn volume(&self) -> &VolumeRef {
        match self {
            TrackerEvent::Started { volume, .. }
            | TrackerEvent::Stuck { volume, .. }
            | TrackerEvent::Unstuck { volume, .. }
            | TrackerEvent::Evicted { volume, .. } => volume,
        }
    }
}

/// The tracker's record for one volume.
#[derive(Debug, Clone)]
pub struct TrackedVolume {
    key: VolumeKey,
    state: TransitionState,
    attachment: AttachmentState,
    last_snapshot: VolumeSnapshot,
    deadline: Instant,
    first_observed_at: DateTime<Utc>,
    last_seen: Instant,
}

impl TrackedVolume {
    fn new(key: VolumeKey, snapshot: &VolumeSnapshot, tolerance: Duration, at: PollInstant) -> Self {
        TrackedVolume {
            key,
            state: TransitionState::Transitioning,
            attachment: classify_attachment(snapshot),
            last_snapshot: snapshot.clone(),
            deadline: deadline_after(at.monotonic, tolerance),
            first_observed_at: at.wall,
            last_seen: at.monotonic,
        }
    }

    pub fn key(&self) -> &VolumeKey {
        &self.key
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    /// The classification of the most recent snapshot.
    pub fn attachment(&self) -> AttachmentState {
        self.attachment
    }

    pub fn last_snapshot(&self) -> &VolumeSnapshot {
        &self.last_snapshot
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn first_observed_at(&self) -> DateTime<Utc> {
        self.first_observed_at
    }

    /// Signed seconds until the deadline; negative once it has passed.
    pub fn seconds_until_deadline(&self, now: Instant) -> f64 {
        match self.deadline.checked_duration_since(now) {
            Some(remaining) => remaining.as_secs_f64(),
            None => -now.duration_since(self.deadline).as_secs_f64(),
        }
    }

    /// The entry's identifying labels.
    pub fn volume_ref(&self) -> VolumeRef {
        VolumeRef {
            key: self.key.clone(),
            zone: self.last_snapshot.availability_zone.clone(),
            volume_id: self.last_snapshot.volume_id.clone(),
        }
    }
}

/// Counts of tracked entries by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerSummary {
    pub transitioning: usize,
    pub stuck: usize,
    pub unstuck: usize,
}

impl TrackerSummary {
    pub fn tracked(&self) -> usize {
        self.transitioning + self.stuck + self.unstuck
    }
}

/// Mapping from volume key to tracked state.
#[derive(Debug, Default)]
pub struct TrackerTable {
    entries: HashMap<VolumeKey, TrackedVolume>,
    policy: TrackerPolicy,
}

impl TrackerTable {
    pub fn new(policy: TrackerPolicy) -> Self {
        TrackerTable {
            entries: HashMap::new(),
            policy,
        }
    }

    /// Wraps a fresh table for sharing with readers.
    pub fn shared(policy: TrackerPolicy) -> SharedTracker {
        Arc::new(RwLock::new(Self::new(policy)))
    }

    pub fn get(&self, key: &VolumeKey) -> Option<&TrackedVolume> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedVolume> {
        self.entries.values()
    }

    /// Iterates entries currently flagged stuck.
    pub fn stuck(&self) -> impl Iterator<Item = &TrackedVolume> {
        self.iter().filter(|e| e.state == TransitionState::Stuck)
    }

    pub fn summary(&self) -> TrackerSummary {
        self.iter()
            .fold(TrackerSummary::default(), |mut acc, e| {
                match e.state {
                    TransitionState::Transitioning => acc.transitioning += 1,
                    TransitionState::Stuck => acc.stuck += 1,
                    TransitionState::Unstuck => acc.unstuck += 1,
                }
                acc
            })
    }

    /// Applies one poll's full listing and returns the resulting events.
    ///
    /// `listing` must be the complete provider response for the poll: volumes
    /// absent from it are treated as missing.
    pub fn apply_listing(&mut self, listing: &[VolumeSnapshot], at: PollInstant) -> Vec<TrackerEvent> {
        let now = at.monotonic;
        let mut events = Vec::new();

        self.entries.retain(|_, entry| {
            if entry.state.is_terminal() {
                events.push(TrackerEvent::Evicted {
                    volume: entry.volume_ref(),
                    last_state: entry.state,
                    reason: EvictionReason::Resolved,
                });
                false
            } else {
                true
            }
        });

        let observed = index_listing(listing);

        for entry in self.entries.values_mut() {
            let Some(snapshot) = observed.get(&entry.key) else {
                continue;
            };

            let attachment = classify_attachment(snapshot);
            let previous = entry.state;
            let next = next_state(previous, attachment, now, entry.deadline);

            entry.state = next;
            entry.attachment = attachment;
            entry.last_snapshot = (*snapshot).clone();
            entry.last_seen = now;

            match (previous, next) {
                (TransitionState::Transitioning, TransitionState::Stuck) => {
                    events.push(TrackerEvent::Stuck {
                        volume: entry.volume_ref(),
                        attachment,
                        overdue: now.saturating_duration_since(entry.deadline),
                    });
                }
                (prev, TransitionState::Unstuck) if prev != TransitionState::Unstuck => {
                    events.push(TrackerEvent::Unstuck {
                        volume: entry.volume_ref(),
                        attachment,
                        was_stuck: prev == TransitionState::Stuck,
                    });
                }
                _ => {}
            }
        }

        let grace = self.policy.missing_grace;
        self.entries.retain(|key, entry| {
            let expired = !observed.contains_key(key)
                && now.saturating_duration_since(entry.last_seen) >= grace;
            if expired {
                events.push(TrackerEvent::Evicted {
                    volume: entry.volume_ref(),
                    last_state: entry.state,
                    reason: EvictionReason::Missing,
                });
            }
            !expired
        });

        for snapshot in transitioning_volumes(listing) {
            let key = VolumeKey::from_snapshot(snapshot);
            if self.entries.contains_key(&key) {
                continue;
            }

            let entry = TrackedVolume::new(key.clone(), snapshot, self.policy.stuck_tolerance, at);
            events.push(TrackerEvent::Started {
                volume: VolumeRef::of(snapshot),
                attachment: entry.attachment,
            });
            self.entries.insert(key, entry);
        }

        events
    }
}

/// `start + tolerance`, clamped to the latest instant the platform can
/// represent.
fn deadline_after(start: Instant, tolerance: Duration) -> Instant {
    let mut tolerance = tolerance;
    loop {
        if let Some(deadline) = start.checked_add(tolerance) {
            return deadline;
        }
        tolerance /= 2;
    }
}

/// Indexes a listing by key.
///
/// Keys are unique by construction; a duplicate means the provider returned
/// the same volume twice in one response.
fn index_listing(listing: &[VolumeSnapshot]) -> HashMap<VolumeKey, &VolumeSnapshot> {
    let mut observed = HashMap::with_capacity(listing.len());
    for snapshot in listing {
        let key = VolumeKey::from_snapshot(snapshot);
        if observed.insert(key.clone(), snapshot).is_some() {
            debug_assert!(false, "duplicate volume key in listing: {key}");
            warn!(key = %key, "Duplicate volume key in listing, keeping the last record");
        }
    }
    observed
}
