//! Decoct Control Plane Server

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use decoct_control_plane::config::{AlertThresholds, Config};
use decoct_control_plane::http;
use decoct_control_plane::scheduler::Scheduler;
use decoct_control_plane::state::AppState;

/// Decoction workflow control plane.
#[derive(Parser, Debug)]
#[command(name = "decoct-control-plane", about = "Decoction workflow tracking and alerting")]
struct Args {
    /// HTTP server address
    #[arg(long, default_value = "127.0.0.1:8080")]
    http_addr: String,

    /// Seconds between alert rule ticks
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    check_interval_secs: u64,

    /// Seconds between dashboard pushes
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    dashboard_interval_secs: u64,

    /// Pending task count above which a backlog alert fires
    #[arg(long, default_value = "10")]
    backlog_threshold: usize,

    /// Capacity of the live event channel
    #[arg(long, default_value = "256")]
    broadcast_capacity: usize,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            http_bind_addr: self.http_addr,
            check_interval_secs: self.check_interval_secs,
            dashboard_interval_secs: self.dashboard_interval_secs,
            broadcast_capacity: self.broadcast_capacity,
            thresholds: AlertThresholds {
                backlog_threshold: self.backlog_threshold,
                ..AlertThresholds::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Args::parse().into_config();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("decoct=info".parse()?))
        .with_target(true)
        .init();

    let http_addr: SocketAddr = config.http_bind_addr.parse()?;
    let check_interval = Duration::from_secs(config.check_interval_secs);
    let dashboard_interval = Duration::from_secs(config.dashboard_interval_secs);

    // Create shared state
    let state = AppState::new(config);

    // Start background jobs
    let shutdown = CancellationToken::new();
    let mut scheduler = Scheduler::new(shutdown.clone());
    scheduler.spawn_alert_checks(state.engine.clone(), check_interval);
    scheduler.spawn_dashboard_push(
        state.repo.clone(),
        std::sync::Arc::new(state.sink.clone()),
        dashboard_interval,
    );

    info!(
        http_addr = %http_addr,
        check_interval_secs = check_interval.as_secs(),
        "Starting decoct control plane"
    );

    // Start HTTP server
    let http_router = http::create_router(state);
    let http_listener = TcpListener::bind(http_addr).await?;
    info!("HTTP server listening on {}", http_addr);

    let server_shutdown = shutdown.clone();
    let result = axum::serve(http_listener, http_router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await;

    if let Err(e) = &result {
        error!(error = %e, "HTTP server error");
    }

    scheduler.shutdown().await;
    info!("Control plane stopped");

    result.map_err(Into::into)
}
