//! Call Gate
//!
//! gRPC gateway enforcing per-consumer access rules, with live call logging
//! and periodic usage statistics for operators.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Initialize Prometheus metrics exporter, if configured
//! 4. Read the access list and start the gRPC server
//! 5. Wait for shutdown signal, then drain

#![warn(clippy::pedantic)]

use std::time::Duration;

use gate_service::config::Config;
use gate_service::context::GateOptions;
use gate_service::observability::metrics::init_metrics_recorder;
use gate_service::server;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long in-flight calls get to finish after the shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration first: it decides the log format.
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gate_service=debug".into());
    if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting Call Gate");
    info!(
        bind_address = %config.bind_address,
        log_delivery = ?config.log_delivery,
        log_queue_capacity = config.log_queue_capacity,
        feed_buffer = config.feed_buffer,
        metrics_enabled = config.metrics_bind_address.is_some(),
        "Configuration loaded successfully"
    );

    if let Some(metrics_addr) = config.metrics_bind_address {
        init_metrics_recorder(metrics_addr).map_err(|e| {
            error!(error = %e, "Failed to install Prometheus metrics exporter");
            e
        })?;
        info!(metrics_address = %metrics_addr, "Prometheus metrics exporter listening");
    }

    let acl_json = config.acl_source.read().map_err(|e| {
        error!(error = %e, "Failed to read access list");
        e
    })?;

    let shutdown_token = CancellationToken::new();
    let gate = server::start_with_options(
        shutdown_token.clone(),
        &config.bind_address,
        &acl_json,
        GateOptions::from(&config),
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to start Call Gate");
        e
    })?;

    info!(local_addr = %gate.local_addr(), "Call Gate running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    shutdown_token.cancel();

    match tokio::time::timeout(DRAIN_TIMEOUT, gate.wait()).await {
        Ok(Ok(())) => info!("Call Gate shutdown complete"),
        Ok(Err(e)) => {
            error!(error = %e, "Call Gate stopped with error");
            return Err(e.into());
        }
        Err(_) => warn!(
            timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "Drain timed out, exiting with calls still in flight"
        ),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
