//! locmap scanner binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use locmap_core::config::ScannerConfig;
use locmap_scanner::Scanner;
use locmap_scanner::metrics::{ScannerMetrics, serve_metrics};
use prometheus::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long a graceful drain may take before workers are cancelled hard.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// locmap - distributed DNS LOC record scanning, scanner side
#[derive(Parser, Debug)]
#[command(name = "locmap-scanner")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "LOCMAP_SCANNER_CONFIG",
        default_value = "config/scanner.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("locmap scanner v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    }

    let config: ScannerConfig = figment
        .merge(Env::prefixed("LOCMAP_SCANNER_").split("__"))
        .extract()
        .context("failed to load configuration (a token is required)")?;

    let registry = Arc::new(Registry::new());
    let metrics = Arc::new(ScannerMetrics::new());
    metrics
        .register(&registry)
        .context("metrics registration failed")?;

    let metrics_addr = config.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_metrics(&metrics_addr, registry).await {
            tracing::warn!(error = %e, "Metrics server exited");
        }
    });

    let scanner = Arc::new(Scanner::new(config, metrics)?);
    let cancel = CancellationToken::new();

    let runner = {
        let scanner = scanner.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scanner.run(cancel).await })
    };

    // First signal: drain gracefully. Second signal, or the grace
    // timeout, cancels hard.
    tokio::select! {
        _ = wait_for_signal() => {
            tracing::info!("Shutdown signal received, draining workers");
            scanner.initiate_shutdown();

            tokio::select! {
                _ = wait_for_signal() => {
                    tracing::warn!("Second signal, cancelling");
                    cancel.cancel();
                }
                _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                    tracing::warn!("Shutdown grace period expired, cancelling");
                    cancel.cancel();
                }
                _ = drain(&runner) => {
                    tracing::info!("Scanner drained gracefully");
                }
            }
        }
        _ = drain(&runner) => {}
    }

    runner.await.context("scanner task")??;
    Ok(())
}

/// Resolve once the scanner task has finished.
async fn drain(runner: &tokio::task::JoinHandle<Result<()>>) {
    while !runner.is_finished() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
