//! Observability setup: structured logging and Prometheus metrics.
//!
//! Metrics are recorded through the `metrics` facade and rendered by the
//! Prometheus recorder installed at startup. The `/metrics` handler renders
//! the recorder's [`PrometheusHandle`].
//!
//! Gauges expire once they go unchanged for the idle timeout. Everything that
//! should stay visible is re-set either every poll or from the tracker table
//! on every scrape, so only the per-volume series of volumes that left the
//! stuck state age out.

use std::time::Duration;

use metrics::{
    Label, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use metrics_util::MetricKindMask;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::provider::ProviderErrorKind;
use crate::state::{TrackerEvent, TrackerSummary, TrackerTable, TransitionState, VolumeRef};

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "volume_monitor=info";

pub const STUCK_VOLUME: &str = "volume_monitor_stuck_volume";
pub const TRACKED_VOLUMES: &str = "volume_monitor_tracked_volumes";
pub const STUCK_TRANSITIONS_TOTAL: &str = "volume_monitor_stuck_transitions_total";
pub const TRACKER_EVENTS_TOTAL: &str = "volume_monitor_tracker_events_total";
pub const POLLS_TOTAL: &str = "volume_monitor_polls_total";
pub const PROVIDER_ERRORS_TOTAL: &str = "volume_monitor_provider_errors_total";
pub const PROVIDER_CONSECUTIVE_FAILURES: &str = "volume_monitor_provider_consecutive_failures";
pub const PROVIDER_DEGRADED: &str = "volume_monitor_provider_degraded";
pub const POLL_DURATION_SECONDS: &str = "volume_monitor_poll_duration_seconds";
pub const APP_CREATE_LATENCY_SECONDS: &str = "app_create_latency_seconds";

/// Buckets for the simulated app creation latency histogram.
pub const APP_CREATE_LATENCY_BUCKETS: &[f64] = &[1.0, 10.0, 60.0, 3.0 * 60.0, 5.0 * 60.0];

/// Buckets for the poll duration histogram.
const POLL_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Lower bound on the gauge idle timeout.
const MIN_GAUGE_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How long a gauge may go unchanged before it is dropped from the output.
///
/// Poll-driven gauges are re-set every tick, so the timeout must span several
/// poll intervals.
pub fn gauge_idle_timeout(poll_interval: Duration) -> Duration {
    poll_interval.saturating_mul(3).max(MIN_GAUGE_IDLE_TIMEOUT)
}

/// Initialises the global tracing subscriber.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Builds the Prometheus recorder with this crate's histogram buckets.
pub fn prometheus_builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(APP_CREATE_LATENCY_SECONDS.to_string()),
            APP_CREATE_LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(POLL_DURATION_SECONDS.to_string()),
            POLL_DURATION_BUCKETS,
        )
}

/// Installs the global Prometheus recorder and describes every metric.
pub fn install_metrics(idle_timeout: Duration) -> Result<PrometheusHandle, BuildError> {
    let handle = prometheus_builder()?
        .idle_timeout(MetricKindMask::GAUGE, Some(idle_timeout))
        .install_recorder()?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_gauge!(
        STUCK_VOLUME,
        "1 while the volume is stuck attaching or detaching, 0 once it is not."
    );
    describe_gauge!(TRACKED_VOLUMES, "Tracked volumes by transition state.");
    describe_counter!(
        STUCK_TRANSITIONS_TOTAL,
        "Volumes that became stuck since startup."
    );
    describe_counter!(TRACKER_EVENTS_TOTAL, "Tracker events by kind.");
    describe_counter!(POLLS_TOTAL, "Poll ticks by outcome.");
    describe_counter!(PROVIDER_ERRORS_TOTAL, "Provider listing failures by kind.");
    describe_gauge!(
        PROVIDER_CONSECUTIVE_FAILURES,
        "Provider listing failures since the last successful poll."
    );
    describe_gauge!(
        PROVIDER_DEGRADED,
        "1 while consecutive provider failures are at or above the degraded threshold."
    );
    describe_histogram!(
        POLL_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time taken by successful poll ticks."
    );
    describe_histogram!(
        APP_CREATE_LATENCY_SECONDS,
        metrics::Unit::Seconds,
        "The latency of various app creation steps."
    );
}

/// Exports one tracker event.
pub fn record_tracker_event(event: &TrackerEvent) {
    let labels = volume_labels(event.volume());

    let kind = match event {
        TrackerEvent::Started { .. } => "started",
        TrackerEvent::Stuck { .. } => {
            gauge!(STUCK_VOLUME, labels.clone()).set(1.0);
            counter!(STUCK_TRANSITIONS_TOTAL).increment(1);
            "stuck"
        }
        TrackerEvent::Unstuck { was_stuck, .. } => {
            if *was_stuck {
                gauge!(STUCK_VOLUME, labels.clone()).set(0.0);
            }
            "unstuck"
        }
        TrackerEvent::Evicted { last_state, .. } => {
            if *last_state == TransitionState::Stuck {
                gauge!(STUCK_VOLUME, labels.clone()).set(0.0);
            }
            "evicted"
        }
    };

    counter!(TRACKER_EVENTS_TOTAL, "kind" => kind).increment(1);
}

fn volume_labels(volume: &VolumeRef) -> Vec<Label> {
    vec![
        Label::new("key", volume.key.to_string()),
        Label::new("zone", volume.zone.clone()),
        Label::new("volume_id", volume.volume_id.clone()),
    ]
}

/// Refreshes every table-derived gauge: the per-state counts and the
/// per-volume stuck flag of each entry that is still stuck.
pub fn record_table_gauges(table: &TrackerTable) {
    record_tracker_summary(&table.summary());
    for entry in table.stuck() {
        gauge!(STUCK_VOLUME, volume_labels(&entry.volume_ref())).set(1.0);
    }
}

/// Publishes the per-state entry counts.
pub fn record_tracker_summary(summary: &TrackerSummary) {
    gauge!(TRACKED_VOLUMES, "state" => "transitioning").set(summary.transitioning as f64);
    gauge!(TRACKED_VOLUMES, "state" => "stuck").set(summary.stuck as f64);
    gauge!(TRACKED_VOLUMES, "state" => "unstuck").set(summary.unstuck as f64);
}

/// Records a successful poll.
pub fn record_poll_success(duration_secs: f64) {
    counter!(POLLS_TOTAL, "outcome" => "success").increment(1);
    histogram!(POLL_DURATION_SECONDS).record(duration_secs);
    gauge!(PROVIDER_CONSECUTIVE_FAILURES).set(0.0);
    gauge!(PROVIDER_DEGRADED).set(0.0);
}

/// Records a failed poll.
pub fn record_poll_failure(kind: ProviderErrorKind, consecutive_failures: u32, degraded: bool) {
    counter!(POLLS_TOTAL, "outcome" => "failure").increment(1);
    counter!(PROVIDER_ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
    gauge!(PROVIDER_CONSECUTIVE_FAILURES).set(f64::from(consecutive_failures));
    gauge!(PROVIDER_DEGRADED).set(if degraded { 1.0 } else { 0.0 });
}

/// Records one simulated app creation step latency.
pub fn record_app_create_latency(step: &'static str, seconds: f64) {
    histogram!(APP_CREATE_LATENCY_SECONDS, "step" => step).record(seconds);
}
