//! Transition rules for a tracked volume.
//!
//! Pure functions: given the current tracked state, a fresh attachment
//! classification and the clock, compute the next state.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::types::AttachmentState;

/// Where a tracked volume is in its transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionState {
    /// Observed attaching or detaching, deadline not yet reached.
    Transitioning,

    /// Still attaching or detaching at or after the deadline.
    Stuck,

    /// The attachment resolved to `Attached` or `Detached`.
    Unstuck,
}

impl TransitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionState::Transitioning => "transitioning",
            TransitionState::Stuck => "stuck",
            TransitionState::Unstuck => "unstuck",
        }
    }

    /// Returns true once the volume has resolved.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransitionState::Unstuck)
    }
}

impl fmt::Display for TransitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes the next state of a tracked volume.
///
/// Rules, in order:
/// 1. A resolved attachment (`Attached`/`Detached`) yields `Unstuck`, even if
///    the deadline has passed in the same poll.
/// 2. Still transitioning at or after `deadline` yields `Stuck`.
/// 3. Otherwise the current state is kept.
///
/// `Stuck` stays `Stuck` while the volume keeps transitioning, and `Unstuck`
/// never moves; a volume that starts transitioning again gets a new entry.
pub fn next_state(
    current: TransitionState,
    attachment: AttachmentState,
    now: Instant,
    deadline: Instant,
) -> TransitionState {
    match current {
        TransitionState::Unstuck => TransitionState::Unstuck,
        _ if attachment.is_resolved() => TransitionState::Unstuck,
        TransitionState::Transitioning if now >= deadline => TransitionState::Stuck,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn arb_attachment_state() -> impl Strategy<Value = AttachmentState> {
        prop_oneof![
            Just(AttachmentState::Attaching),
            Just(AttachmentState::Detaching),
            Just(AttachmentState::Attached),
            Just(AttachmentState::Detached),
        ]
    }

    fn arb_transition_state() -> impl Strategy<Value = TransitionState> {
        prop_oneof![
            Just(TransitionState::Transitioning),
            Just(TransitionState::Stuck),
            Just(TransitionState::Unstuck),
        ]
    }

    #[test]
    fn stays_transitioning_before_deadline() {
        let t0 = Instant::now();
        let deadline = t0 + Duration::from_secs(5);
        assert_eq!(
            next_state(
                TransitionState::Transitioning,
                AttachmentState::Detaching,
                t0 + Duration::from_secs(3),
                deadline
            ),
            TransitionState::Transitioning
        );
    }

    #[test]
    fn becomes_stuck_exactly_at_deadline() {
        let t0 = Instant::now();
        let deadline = t0 + Duration::from_secs(5);
        assert_eq!(
            next_state(
                TransitionState::Transitioning,
                AttachmentState::Attaching,
                deadline,
                deadline
            ),
            TransitionState::Stuck
        );
    }

    #[test]
    fn resolution_wins_over_expired_deadline() {
        let t0 = Instant::now();
        let deadline = t0 + Duration::from_secs(5);
        assert_eq!(
            next_state(
                TransitionState::Transitioning,
                AttachmentState::Attached,
                t0 + Duration::from_secs(60),
                deadline
            ),
            TransitionState::Unstuck
        );
    }

    #[test]
    fn stuck_recovers_when_resolved() {
        let t0 = Instant::now();
        assert_eq!(
            next_state(
                TransitionState::Stuck,
                AttachmentState::Detached,
                t0 + Duration::from_secs(10),
                t0
            ),
            TransitionState::Unstuck
        );
    }

    proptest! {
        #[test]
        fn resolved_always_unstuck(
            current in arb_transition_state(),
            attachment in arb_attachment_state(),
            offset in 0u64..20,
        ) {
            prop_assume!(attachment.is_resolved());
            let t0 = Instant::now();
            let next = next_state(
                current,
                attachment,
                t0 + Duration::from_secs(offset),
                t0 + Duration::from_secs(5),
            );
            prop_assert_eq!(next, TransitionState::Unstuck);
        }

        #[test]
        fn never_stuck_before_deadline(
            attachment in arb_attachment_state(),
            offset in 0u64..5,
        ) {
            let t0 = Instant::now();
            let next = next_state(
                TransitionState::Transitioning,
                attachment,
                t0 + Duration::from_secs(offset),
                t0 + Duration::from_secs(5),
            );
            prop_assert_ne!(next, TransitionState::Stuck);
        }
    }
}
