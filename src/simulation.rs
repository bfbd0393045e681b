//! Simulated app creation latencies.
//!
//! Emits one synthetic sample per step on every interval into the
//! `app_create_latency_seconds` histogram, so dashboards and alerts can be
//! exercised without a real workload.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::observability::record_app_create_latency;

/// A simulated step and its latency range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedStep {
    pub name: &'static str,
    pub min: Duration,
    pub max: Duration,
}

/// The steps of a simulated app creation.
pub const STEPS: &[SimulatedStep] = &[
    SimulatedStep {
        name: "new-app",
        min: Duration::from_secs(1),
        max: Duration::from_secs(5),
    },
    SimulatedStep {
        name: "build",
        min: Duration::from_secs(60),
        max: Duration::from_secs(5 * 60),
    },
    SimulatedStep {
        name: "deploy",
        min: Duration::from_secs(60),
        max: Duration::from_secs(5 * 60),
    },
    SimulatedStep {
        name: "expose",
        min: Duration::from_secs(10),
        max: Duration::from_secs(60),
    },
];

impl SimulatedStep {
    /// Draws a latency in `[min, max)`.
    pub fn sample(&self, rng: &mut impl Rng) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let nanos = rng.random_range(self.min.as_nanos() as u64..self.max.as_nanos() as u64);
        Duration::from_nanos(nanos)
    }
}

/// Records one sample per step.
pub fn record_samples(rng: &mut impl Rng) {
    for step in STEPS {
        let latency = step.sample(rng);
        record_app_create_latency(step.name, latency.as_secs_f64());
    }
}

/// Runs the simulator until `shutdown` is cancelled.
pub async fn run_latency_simulation(interval: Duration, shutdown: CancellationToken) {
    info!(?interval, "Latency simulation started");

    let mut rng = StdRng::from_os_rng();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                record_samples(&mut rng);
                debug!(steps = STEPS.len(), "Recorded simulated latencies");
            }
        }
    }

    info!("Latency simulation stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn samples_stay_in_range(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            for step in STEPS {
                let latency = step.sample(&mut rng);
                prop_assert!(latency >= step.min);
                prop_assert!(latency < step.max);
            }
        }
    }

    #[test]
    fn degenerate_range_returns_min() {
        let step = SimulatedStep {
            name: "fixed",
            min: Duration::from_secs(3),
            max: Duration::from_secs(3),
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(step.sample(&mut rng), Duration::from_secs(3));
    }

    #[test]
    fn records_every_step() {
        let recorder = crate::observability::prometheus_builder()
            .unwrap()
            .build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_samples(&mut StdRng::seed_from_u64(7));
        });

        let rendered = handle.render();
        for step in STEPS {
            assert!(
                rendered.contains(&format!("step=\"{}\"", step.name)),
                "missing step {}",
                step.name
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_latency_simulation(
            Duration::from_secs(1),
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
