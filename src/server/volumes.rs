//! Read-only view of the tracker table.

use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::state::{TrackedVolume, TrackerSummary, TransitionState};
use crate::types::AttachmentState;

/// One tracked volume as served over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeView {
    pub key: String,
    pub zone: String,
    pub volume_id: String,
    pub state: TransitionState,
    pub attachment: AttachmentState,
    pub first_observed_at: DateTime<Utc>,
    /// Negative once the deadline has passed.
    pub seconds_until_deadline: f64,
}

impl VolumeView {
    fn from_entry(entry: &TrackedVolume, now: Instant) -> Self {
        let snapshot = entry.last_snapshot();
        VolumeView {
            key: entry.key().to_string(),
            zone: snapshot.availability_zone.clone(),
            volume_id: snapshot.volume_id.clone(),
            state: entry.state(),
            attachment: entry.attachment(),
            first_observed_at: entry.first_observed_at(),
            seconds_until_deadline: entry.seconds_until_deadline(now),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VolumesResponse {
    pub summary: TrackerSummary,
    pub volumes: Vec<VolumeView>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VolumesQuery {
    /// Only return entries in this state.
    pub state: Option<TransitionState>,
}

/// Lists tracked volumes, sorted by key.
///
/// # Example
///
/// ```ignore
/// GET /api/v1/volumes?state=stuck HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// {
///   "summary": { "transitioning": 0, "stuck": 1, "unstuck": 0 },
///   "volumes": [
///     { "key": "aws://us-east-1c/vol-1", "state": "stuck", ... }
///   ]
/// }
/// ```
pub async fn volumes_handler(
    State(app_state): State<AppState>,
    Query(query): Query<VolumesQuery>,
) -> Json<VolumesResponse> {
    let tracker = app_state.tracker();
    let table = tracker.read().await;
    let now = Instant::now();

    let mut volumes: Vec<VolumeView> = table
        .iter()
        .filter(|entry| query.state.is_none_or(|state| entry.state() == state))
        .map(|entry| VolumeView::from_entry(entry, now))
        .collect();
    volumes.sort_by(|a, b| a.key.cmp(&b.key));

    Json(VolumesResponse {
        summary: table.summary(),
        volumes,
    })
}
