use std::future::IntoFuture;
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use volume_monitor::config::{Cli, ConfigError, MonitorConfig};
use volume_monitor::observability::{gauge_idle_timeout, init_tracing, install_metrics};
use volume_monitor::provider::{ProviderError, ProviderErrorKind, VolumeProvider, with_timeout};
use volume_monitor::server::{AppState, build_router};
use volume_monitor::simulation::run_latency_simulation;
use volume_monitor::state::TrackerTable;
use volume_monitor::worker::{MonitorExit, MonitorWorker, check_monitor_exit};

/// Failures that end the process with a non-zero exit code.
#[derive(Debug, Error)]
enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("provider session check failed: {0}")]
    Session(#[source] ProviderError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("server task panicked: {0}")]
    ServerPanicked(#[source] tokio::task::JoinError),

    #[error(transparent)]
    Monitor(#[from] MonitorExit),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Volume monitor failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let config = cli.into_config()?;
    let metrics = install_metrics(gauge_idle_timeout(config.poll.poll_interval))?;

    check_session(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.listen_address)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.listen_address,
            source,
        })?;

    let tracker = TrackerTable::shared(config.tracker);
    let shutdown = CancellationToken::new();

    let worker = MonitorWorker::new(config.provider, tracker.clone(), config.poll);
    let mut worker_task = tokio::spawn(worker.run(shutdown.clone()));

    let sim_task = config
        .latency_sim_interval
        .map(|interval| tokio::spawn(run_latency_simulation(interval, shutdown.clone())));

    let app = build_router(AppState::new(tracker, metrics));
    info!(addr = %config.listen_address, "Listening");
    let mut server_task = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future(),
    );

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    // Whichever of the two stops first takes the other down with it.
    let (monitored, served) = tokio::select! {
        joined = &mut worker_task => {
            let monitored = check_monitor_exit(joined, &shutdown);
            shutdown.cancel();
            (monitored, server_task.await)
        }
        joined = &mut server_task => {
            shutdown.cancel();
            let monitored = check_monitor_exit(worker_task.await, &shutdown);
            (monitored, joined)
        }
    };

    if let Some(task) = sim_task
        && let Err(e) = task.await
    {
        error!(error = %e, "Latency simulation task panicked");
    }

    served.map_err(StartupError::ServerPanicked)?.map_err(StartupError::Serve)?;
    monitored?;
    info!("Shut down cleanly");
    Ok(())
}

/// Verifies provider credentials once before polling starts.
///
/// Terminal failures (bad credentials, missing file) abort startup. Anything
/// else is logged and left to the poll loop to retry.
async fn check_session(config: &MonitorConfig) -> Result<(), StartupError> {
    let provider = &config.provider;
    let result = with_timeout(config.poll.provider_timeout, provider.check_session()).await;

    match result {
        Ok(()) => info!(provider = provider.name(), "Provider session verified"),
        Err(e) => match e.kind {
            ProviderErrorKind::Terminal => return Err(StartupError::Session(e)),
            ProviderErrorKind::Transient | ProviderErrorKind::Unknown => {
                warn!(provider = provider.name(), error = %e, "Provider session check failed, continuing");
            }
        },
    }
    Ok(())
}

/// Waits for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
