//! Newtype wrapper for volume identity.
//!
//! The tracker recognises a volume across polls only through its key, so the
//! key must be derived the same way every time from the same snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::volume::VolumeSnapshot;

/// URI scheme used for volume keys.
pub const KEY_SCHEME: &str = "aws";

/// A globally unique, stable key for a volume: `aws://<zone>/<volume-id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeKey(String);

impl VolumeKey {
    /// Builds the key from a location and a native identifier.
    pub fn new(availability_zone: &str, volume_id: &str) -> Self {
        VolumeKey(format!("{KEY_SCHEME}://{availability_zone}/{volume_id}"))
    }

    /// Derives the key for a snapshot.
    pub fn from_snapshot(snapshot: &VolumeSnapshot) -> Self {
        Self::new(&snapshot.availability_zone, &snapshot.volume_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
