//! Volume snapshots as reported by the provider.
//!
//! The field names follow the EC2 `DescribeVolumes` response so that both the
//! AWS CLI output and inventory files deserialize without any mapping layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The raw attachment state token on a single attachment record.
///
/// EC2 reports `attaching`, `detaching`, `attached`, `detached` and `busy`.
/// Anything outside the four lifecycle tokens, including a missing field,
/// becomes [`AttachmentToken::Unknown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentToken {
    Attaching,
    Detaching,
    Attached,
    Detached,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One attachment of a volume to an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttachmentRecord {
    /// The attachment state token.
    #[serde(default)]
    pub state: AttachmentToken,

    /// The instance the volume is (being) attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// The device name exposed to the instance (e.g. `/dev/sdf`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl AttachmentRecord {
    /// Creates a record with only a state token.
    pub fn new(state: AttachmentToken) -> Self {
        AttachmentRecord {
            state,
            ..Default::default()
        }
    }
}

/// A read-only view of one volume at poll time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeSnapshot {
    /// The provider's native identifier (e.g. `vol-0abc123`).
    pub volume_id: String,

    /// The availability zone the volume lives in (e.g. `us-east-1c`).
    pub availability_zone: String,

    /// Attachment records in provider order.
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
}

impl VolumeSnapshot {
    pub fn new(volume_id: impl Into<String>, availability_zone: impl Into<String>) -> Self {
        VolumeSnapshot {
            volume_id: volume_id.into(),
            availability_zone: availability_zone.into(),
            attachments: Vec::new(),
        }
    }
}

/// The top-level `DescribeVolumes` response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeListing {
    #[serde(default)]
    pub volumes: Vec<VolumeSnapshot>,
}

/// The coarse attachment state of a volume, derived from its records.
///
/// Never stored as the source of truth: it is recomputed from the snapshot
/// on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentState {
    Attaching,
    Detaching,
    Attached,
    Detached,
}

impl AttachmentState {
    /// Returns true for `Attaching` and `Detaching`.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, AttachmentState::Attaching | AttachmentState::Detaching)
    }

    /// Returns true for `Attached` and `Detached`.
    pub fn is_resolved(&self) -> bool {
        !self.is_transitioning()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentState::Attaching => "attaching",
            AttachmentState::Detaching => "detaching",
            AttachmentState::Attached => "attached",
            AttachmentState::Detached => "detached",
        }
    }
}

impl fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
