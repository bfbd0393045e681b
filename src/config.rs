//! Command-line and environment configuration.
//!
//! Every flag can also be set through a `VOLUME_MONITOR_*` environment
//! variable. [`Cli::into_config`] validates the raw values and produces the
//! typed [`MonitorConfig`] used by the rest of the program.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use thiserror::Error;

use crate::provider::{AnyProvider, AwsCliProvider, InventoryFileProvider};
use crate::state::TrackerPolicy;
use crate::state::tracker::DEFAULT_STUCK_TOLERANCE_SECS;
use crate::worker::PollConfig;
use crate::worker::poll::{
    DEFAULT_DEGRADED_AFTER, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_PROVIDER_TIMEOUT_SECS,
};

/// Upper bound for every duration flag (30 days).
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Errors in the supplied configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The listen address could not be parsed.
    #[error("invalid listen address {0:?}: expected host:port or :port")]
    InvalidListenAddress(String),

    /// A duration that must be positive was zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// A duration exceeded [`MAX_DURATION_SECS`].
    #[error("{flag} must be at most {max_secs} seconds")]
    DurationTooLarge { flag: &'static str, max_secs: u64 },

    /// The file provider was selected without a file.
    #[error("--inventory-file is required with --provider file")]
    MissingInventoryFile,
}

/// Where volume listings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// `aws ec2 describe-volumes` through the AWS CLI.
    AwsCli,
    /// A `DescribeVolumes` JSON file, re-read every poll.
    File,
}

/// Watches EBS volume attachments and flags transitions that get stuck.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "volume-monitor",
    version,
    about,
    after_help = "The aws-cli provider runs `aws ec2 describe-volumes` and needs the AWS CLI \
                  installed (on PATH, or given with --aws-cli-path) with credentials available \
                  to it. The file provider has no runtime dependencies."
)]
pub struct Cli {
    /// The address to listen on for HTTP requests.
    #[arg(long, env = "VOLUME_MONITOR_LISTEN_ADDRESS", default_value = ":8080")]
    pub listen_address: String,

    /// Seconds a volume may stay attaching/detaching before it is stuck.
    #[arg(long, env = "VOLUME_MONITOR_STUCK_TOLERANCE_SECS", default_value_t = DEFAULT_STUCK_TOLERANCE_SECS)]
    pub stuck_tolerance_secs: u64,

    /// Seconds between polls.
    #[arg(long, env = "VOLUME_MONITOR_POLL_INTERVAL_SECS", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,

    /// Seconds before a single provider listing call is abandoned.
    #[arg(long, env = "VOLUME_MONITOR_PROVIDER_TIMEOUT_SECS", default_value_t = DEFAULT_PROVIDER_TIMEOUT_SECS)]
    pub provider_timeout_secs: u64,

    /// Seconds a vanished volume stays tracked. Defaults to two poll intervals.
    #[arg(long, env = "VOLUME_MONITOR_MISSING_GRACE_SECS")]
    pub missing_grace_secs: Option<u64>,

    /// Consecutive failed polls before the provider is reported degraded (0 disables).
    #[arg(long, env = "VOLUME_MONITOR_DEGRADED_AFTER", default_value_t = DEFAULT_DEGRADED_AFTER)]
    pub degraded_after: u32,

    /// Where volume listings come from.
    #[arg(long, env = "VOLUME_MONITOR_PROVIDER", value_enum, default_value_t = ProviderKind::AwsCli)]
    pub provider: ProviderKind,

    /// Path of the inventory file for `--provider file`.
    #[arg(long, env = "VOLUME_MONITOR_INVENTORY_FILE")]
    pub inventory_file: Option<PathBuf>,

    /// The AWS CLI executable used by `--provider aws-cli`.
    #[arg(long, env = "VOLUME_MONITOR_AWS_CLI_PATH", default_value = "aws")]
    pub aws_cli_path: String,

    /// AWS region passed to the CLI.
    #[arg(long, env = "VOLUME_MONITOR_AWS_REGION")]
    pub aws_region: Option<String>,

    /// AWS named profile passed to the CLI.
    #[arg(long, env = "VOLUME_MONITOR_AWS_PROFILE")]
    pub aws_profile: Option<String>,

    /// Emit simulated app creation latencies.
    #[arg(long, env = "VOLUME_MONITOR_LATENCY_SIM", default_value_t = true, action = ArgAction::Set)]
    pub latency_sim: bool,

    /// Seconds between simulated latency samples.
    #[arg(long, env = "VOLUME_MONITOR_LATENCY_SIM_INTERVAL_SECS", default_value_t = 1)]
    pub latency_sim_interval_secs: u64,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub listen_address: SocketAddr,
    pub tracker: TrackerPolicy,
    pub poll: PollConfig,
    pub provider: AnyProvider,
    /// `None` disables the latency simulator.
    pub latency_sim_interval: Option<Duration>,
}

impl Cli {
    /// Validates the raw flags.
    pub fn into_config(self) -> Result<MonitorConfig, ConfigError> {
        let listen_address = parse_listen_address(&self.listen_address)?;

        let stuck_tolerance = bounded_secs(self.stuck_tolerance_secs, "--stuck-tolerance-secs")?;
        let poll_interval = positive_secs(self.poll_interval_secs, "--poll-interval-secs")?;
        let provider_timeout = positive_secs(self.provider_timeout_secs, "--provider-timeout-secs")?;
        let missing_grace = match self.missing_grace_secs {
            Some(secs) => bounded_secs(secs, "--missing-grace-secs")?,
            None => poll_interval.saturating_mul(2),
        };

        let provider = match self.provider {
            ProviderKind::AwsCli => AnyProvider::AwsCli(
                AwsCliProvider::new()
                    .with_binary(self.aws_cli_path)
                    .with_region(self.aws_region)
                    .with_profile(self.aws_profile),
            ),
            ProviderKind::File => AnyProvider::File(InventoryFileProvider::new(
                self.inventory_file.ok_or(ConfigError::MissingInventoryFile)?,
            )),
        };

        let latency_sim_interval = if self.latency_sim {
            Some(positive_secs(
                self.latency_sim_interval_secs,
                "--latency-sim-interval-secs",
            )?)
        } else {
            None
        };

        Ok(MonitorConfig {
            listen_address,
            tracker: TrackerPolicy {
                stuck_tolerance,
                missing_grace,
            },
            poll: PollConfig {
                poll_interval,
                provider_timeout,
                degraded_after: self.degraded_after,
            },
            provider,
            latency_sim_interval,
        })
    }
}

fn positive_secs(secs: u64, flag: &'static str) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::ZeroDuration(flag));
    }
    bounded_secs(secs, flag)
}

fn bounded_secs(secs: u64, flag: &'static str) -> Result<Duration, ConfigError> {
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError::DurationTooLarge {
            flag,
            max_secs: MAX_DURATION_SECS,
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Parses `host:port`, or `:port` meaning all interfaces.
pub fn parse_listen_address(addr: &str) -> Result<SocketAddr, ConfigError> {
    let candidate = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => addr.to_string(),
    };
    candidate
        .parse()
        .map_err(|_| ConfigError::InvalidListenAddress(addr.to_string()))
}
