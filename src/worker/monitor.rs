//! The poll loop that drives the transition tracker.
//!
//! # Tick Processing Flow
//!
//! 1. Fetch a full listing from the provider, bounded by the provider timeout
//!    and raced against shutdown
//! 2. On failure: report by error kind, keep the existing table untouched
//! 3. On success: apply the whole listing to the tracker under one write lock
//! 4. Log and export the resulting tracker events
//!
//! # Critical Invariant
//!
//! All transitions from one tick are applied inside a single write-lock
//! critical section, so readers never observe a mix of two ticks or a
//! partially updated entry.

use std::time::Instant;

use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::observability::{
    record_poll_failure, record_poll_success, record_tracker_event, record_tracker_summary,
};
use crate::provider::{ProviderError, ProviderErrorKind, VolumeProvider, with_timeout};
use crate::state::{
    EvictionReason, PollInstant, SharedTracker, TrackerEvent, TrackerSummary, transitioning_volumes,
};

use super::poll::PollConfig;

/// Errors from a single poll tick.
#[derive(Debug, Error)]
pub enum PollError {
    /// The provider listing failed or timed out.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Shutdown was requested while the listing was in flight.
    #[error("poll cancelled by shutdown")]
    Cancelled,
}

/// Why the monitor task ended when it should still be running.
#[derive(Debug, Error)]
pub enum MonitorExit {
    /// The loop returned without shutdown having been requested.
    #[error("monitor loop stopped before shutdown was requested")]
    Unexpected,

    /// The loop panicked.
    #[error("monitor loop panicked: {0}")]
    Panicked(#[source] JoinError),
}

/// Checks how the spawned monitor task ended.
///
/// Only a normal return after `shutdown` was cancelled is a clean exit.
/// Anything else means polling has stopped while the process is still up.
pub fn check_monitor_exit(
    joined: Result<(), JoinError>,
    shutdown: &CancellationToken,
) -> Result<(), MonitorExit> {
    match joined {
        Ok(()) if shutdown.is_cancelled() => Ok(()),
        Ok(()) => Err(MonitorExit::Unexpected),
        Err(e) => Err(MonitorExit::Panicked(e)),
    }
}

/// What a successful tick did.
#[derive(Debug)]
pub struct TickReport {
    /// Volumes in the listing.
    pub observed: usize,
    /// Volumes in the listing that were attaching or detaching.
    pub transitioning: usize,
    /// Tracker events produced by the tick.
    pub events: Vec<TrackerEvent>,
    /// Table counts after the tick.
    pub summary: TrackerSummary,
}

/// Drives the tracker from a provider on a fixed interval.
pub struct MonitorWorker<P> {
    provider: P,
    tracker: SharedTracker,
    config: PollConfig,
    consecutive_failures: u32,
}

impl<P: VolumeProvider> MonitorWorker<P> {
    pub fn new(provider: P, tracker: SharedTracker, config: PollConfig) -> Self {
        MonitorWorker {
            provider,
            tracker,
            config,
            consecutive_failures: 0,
        }
    }

    /// Returns a handle to the tracker table.
    pub fn tracker(&self) -> SharedTracker {
        self.tracker.clone()
    }

    /// Failed polls since the last successful one.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Runs the poll loop until `shutdown` is cancelled.
    ///
    /// The first poll happens immediately. A failed poll is reported and the
    /// loop carries on with the next tick.
    #[instrument(skip(self, shutdown), fields(provider = self.provider.name()))]
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            poll_interval = ?self.config.poll_interval,
            provider_timeout = ?self.config.provider_timeout,
            "Monitor loop started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping monitor loop");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match self.poll_once(&shutdown).await {
                Ok(report) => debug!(
                    observed = report.observed,
                    transitioning = report.transitioning,
                    events = report.events.len(),
                    stuck = report.summary.stuck,
                    "Poll complete"
                ),
                Err(PollError::Cancelled) => {
                    info!("Shutdown during poll, stopping monitor loop");
                    break;
                }
                // Already reported by poll_once.
                Err(PollError::Provider(_)) => {}
            }
        }

        info!("Monitor loop stopped");
    }

    /// Runs one poll tick.
    pub async fn poll_once(&mut self, shutdown: &CancellationToken) -> Result<TickReport, PollError> {
        let started = Instant::now();

        let fetch = with_timeout(self.config.provider_timeout, self.provider.describe_volumes());
        let result = tokio::select! {
            _ = shutdown.cancelled() => return Err(PollError::Cancelled),
            result = fetch => result,
        };

        let listing = match result {
            Ok(listing) => listing,
            Err(e) => {
                self.report_failure(&e);
                return Err(e.into());
            }
        };

        let transitioning = transitioning_volumes(&listing).len();
        let (events, summary) = {
            let mut tracker = self.tracker.write().await;
            let events = tracker.apply_listing(&listing, PollInstant::now());
            (events, tracker.summary())
        };

        self.report_success(started);
        for event in &events {
            log_event(event);
            record_tracker_event(event);
        }
        record_tracker_summary(&summary);

        Ok(TickReport {
            observed: listing.len(),
            transitioning,
            events,
            summary,
        })
    }

    fn report_success(&mut self, started: Instant) {
        if self.consecutive_failures > 0 {
            info!(
                failures = self.consecutive_failures,
                "Provider recovered"
            );
        }
        self.consecutive_failures = 0;
        record_poll_success(started.elapsed().as_secs_f64());
    }

    fn report_failure(&mut self, err: &ProviderError) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let failures = self.consecutive_failures;

        match err.kind {
            ProviderErrorKind::Transient => {
                warn!(error = %err, failures, "Provider listing failed, retrying next tick");
            }
            ProviderErrorKind::Terminal => {
                error!(error = %err, failures, "Provider listing failed and needs operator action");
            }
            ProviderErrorKind::Unknown => {
                error!(error = %err, failures, "Provider listing failed");
            }
        }

        if self.config.just_degraded(failures) {
            error!(
                failures,
                "Provider degraded: stuck detection is running on stale data"
            );
        }

        record_poll_failure(err.kind, failures, self.config.is_degraded(failures));
    }
}

fn log_event(event: &TrackerEvent) {
    match event {
        TrackerEvent::Started { volume, attachment } => {
            info!(key = %volume.key, %attachment, "Volume transition started");
        }
        TrackerEvent::Stuck {
            volume,
            attachment,
            overdue,
        } => {
            warn!(
                key = %volume.key,
                zone = %volume.zone,
                volume_id = %volume.volume_id,
                %attachment,
                overdue_secs = overdue.as_secs_f64(),
                "Volume stuck"
            );
        }
        TrackerEvent::Unstuck {
            volume,
            attachment,
            was_stuck,
        } => {
            info!(key = %volume.key, %attachment, was_stuck, "Volume transition resolved");
        }
        TrackerEvent::Evicted {
            volume,
            last_state,
            reason,
        } => match reason {
            EvictionReason::Resolved => {
                debug!(key = %volume.key, "Dropped resolved volume");
            }
            EvictionReason::Missing => {
                info!(
                    key = %volume.key,
                    %last_state,
                    "Dropped volume no longer listed by the provider"
                );
            }
        },
    }
}
