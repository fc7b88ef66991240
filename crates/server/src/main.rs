//! locmap coordinator binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use locmap_core::config::AppConfig;
use locmap_server::feeder::upstream::{self, CorpusClient};
use locmap_server::feeder::Feeder;
use locmap_server::reaper::Reaper;
use locmap_server::{AppState, create_router};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// locmap - distributed DNS LOC record scanning, coordinator side
#[derive(Parser, Debug)]
#[command(name = "locmapd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "LOCMAP_CONFIG",
        default_value = "config/coordinator.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("locmap coordinator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("LOCMAP_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Initialize the store and run migrations
    let store = locmap_store::from_config(&config.database)
        .await
        .context("failed to initialize store")?;
    store
        .health_check()
        .await
        .context("store health check failed")?;
    tracing::info!("Store initialized");

    let state = AppState::new(config.clone(), store.clone());

    // Background tasks all hang off one cancellation token.
    let cancel = CancellationToken::new();

    let updater = locmap_server::metrics::Updater::new(
        store.clone(),
        state.metrics.clone(),
        config.server.metrics_interval(),
        config.server.heartbeat_timeout(),
    );
    tokio::spawn(updater.run(cancel.clone()));

    let reaper = Reaper::new(
        store.clone(),
        config.reaper.clone(),
        config.server.heartbeat_timeout(),
        state.metrics.clone(),
    );
    tokio::spawn(reaper.run(cancel.clone()));

    let feeder = Feeder::new(store.clone(), config.feeder.clone(), state.metrics.clone())
        .context("failed to build feeder")?;
    tokio::spawn(feeder.run(cancel.clone()));

    // Initial file discovery (non-blocking; the admin endpoint can
    // re-run it at any time)
    {
        let store = store.clone();
        let upstream_config = config.feeder.upstream.clone();
        tokio::spawn(async move {
            tracing::info!("Starting initial file discovery");
            let client = match CorpusClient::new(&upstream_config) {
                Ok(client) => client,
                Err(e) => {
                    tracing::warn!(error = %e, "Discovery client build failed");
                    return;
                }
            };
            match upstream::discover_files(&client, store.as_ref()).await {
                Ok(count) => tracing::info!(count, "Initial file discovery complete"),
                Err(e) => tracing::warn!(error = %e, "Initial file discovery failed"),
            }
        });
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!("Coordinator listening on {addr}");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_signal().await;
            tracing::info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    tracing::info!("Goodbye");
    Ok(())
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
