//! Core domain types for the volume monitor.

pub mod ids;
pub mod volume;

pub use ids::{KEY_SCHEME, VolumeKey};
pub use volume::{AttachmentRecord, AttachmentState, AttachmentToken, VolumeListing, VolumeSnapshot};
