//! Attachment classification and the transition filter.
//!
//! A volume may carry several attachment records that disagree (e.g. a
//! multi-attach volume detaching from one instance while attached to another).
//! The coarse state is the first match in precedence order:
//! `Attaching` > `Detaching` > `Attached` > `Detached`.

use crate::types::{AttachmentState, AttachmentToken, VolumeSnapshot};

/// Classifies a volume's attachment records into one coarse state.
///
/// Volumes with no records, or only unrecognised tokens, are `Detached`.
pub fn classify_attachment(snapshot: &VolumeSnapshot) -> AttachmentState {
    let has = |token: AttachmentToken| snapshot.attachments.iter().any(|a| a.state == token);

    if has(AttachmentToken::Attaching) {
        AttachmentState::Attaching
    } else if has(AttachmentToken::Detaching) {
        AttachmentState::Detaching
    } else if has(AttachmentToken::Attached) {
        AttachmentState::Attached
    } else {
        AttachmentState::Detached
    }
}

/// Returns the volumes currently attaching or detaching, in input order.
pub fn transitioning_volumes(volumes: &[VolumeSnapshot]) -> Vec<&VolumeSnapshot> {
    volumes
        .iter()
        .filter(|v| classify_attachment(v).is_transitioning())
        .collect()
}
