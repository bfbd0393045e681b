//! Shared test utilities and arbitrary generators for property-based testing.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use proptest::prelude::*;

use crate::provider::{ProviderError, VolumeProvider};
use crate::state::tracker::PollInstant;
use crate::types::{AttachmentRecord, AttachmentToken, VolumeSnapshot};

pub fn arb_attachment_token() -> impl Strategy<Value = AttachmentToken> {
    prop_oneof![
        Just(AttachmentToken::Attaching),
        Just(AttachmentToken::Detaching),
        Just(AttachmentToken::Attached),
        Just(AttachmentToken::Detached),
        Just(AttachmentToken::Unknown),
    ]
}

pub fn arb_attachment_record() -> impl Strategy<Value = AttachmentRecord> {
    (
        arb_attachment_token(),
        prop::option::of("i-[0-9a-f]{8,17}"),
    )
        .prop_map(|(state, instance_id)| AttachmentRecord {
            state,
            instance_id,
            device: None,
        })
}

pub fn arb_zone() -> impl Strategy<Value = String> {
    "(us|eu|ap)-(east|west|north)-[1-3][a-c]".prop_map(String::from)
}

pub fn arb_volume_id() -> impl Strategy<Value = String> {
    "vol-[0-9a-f]{8,17}".prop_map(String::from)
}

pub fn arb_volume_snapshot() -> impl Strategy<Value = VolumeSnapshot> {
    (
        arb_volume_id(),
        arb_zone(),
        prop::collection::vec(arb_attachment_record(), 0..4),
    )
        .prop_map(|(volume_id, availability_zone, attachments)| VolumeSnapshot {
            volume_id,
            availability_zone,
            attachments,
        })
}

/// A listing whose volumes have distinct IDs, as the provider guarantees.
pub fn arb_listing() -> impl Strategy<Value = Vec<VolumeSnapshot>> {
    prop::collection::vec(arb_volume_snapshot(), 0..12).prop_map(|mut volumes| {
        for (ix, volume) in volumes.iter_mut().enumerate() {
            volume.volume_id = format!("{}-{ix}", volume.volume_id);
        }
        volumes
    })
}

/// A volume snapshot with one attachment record per token.
pub fn volume(id: &str, tokens: &[AttachmentToken]) -> VolumeSnapshot {
    VolumeSnapshot {
        attachments: tokens.iter().copied().map(AttachmentRecord::new).collect(),
        ..VolumeSnapshot::new(id, "us-east-1c")
    }
}

/// A poll instant `secs` seconds after `base`.
pub fn at(base: Instant, secs: u64) -> PollInstant {
    PollInstant {
        monotonic: base + Duration::from_secs(secs),
        wall: Utc::now(),
    }
}

/// A provider that replays a fixed script of listing results.
///
/// Once the script is exhausted every call returns an empty listing.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<Vec<VolumeSnapshot>, ProviderError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, listing: Vec<VolumeSnapshot>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(listing));
        self
    }

    pub fn then_err(self, err: ProviderError) -> Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    /// Makes every listing call sleep for `delay` first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VolumeProvider for ScriptedProvider {
    async fn describe_volumes(&self) -> Result<Vec<VolumeSnapshot>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn check_session(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
