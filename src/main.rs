//! Guest portal - captive-portal login page for UniFi guest networks
//!
//! Guests redirected by the controller get a login page; submitting it
//! authorizes their device on the controller for a fixed duration and
//! records the visit.

mod audit;
mod cache;
mod config;
mod controller;
mod frontend;
mod http;
mod models;
mod router;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "guest-portal")]
#[command(about = "UniFi Guest Portal", long_about = None)]
struct Args {
    /// Config file path (default: search config.toml, /etc/guest-portal, ~/.config/guest-portal)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overrides config and PORT
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging before config so loading is visible; the level is
    // refined once the config (and any .env RUST_LOG) is known.
    let (filter, filter_handle) = reload::Layer::new(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut cfg = config::Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        cfg.server.port = port;
    }

    filter_handle
        .reload(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level)),
        )
        .context("Failed to apply log level")?;

    tracing::info!("Guest Portal v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Controller: {} (site '{}')", cfg.controller.url, cfg.controller.site);
    tracing::info!("Guest access: {} minutes", cfg.controller.duration);

    run(cfg).await
}

async fn run(cfg: config::Config) -> Result<()> {
    let store = Arc::new(cache::PendingLogins::new());
    let controller = controller::UnifiController::new(&cfg.controller)
        .context("Failed to build controller client")?;
    let audit = audit::SqliteAuditSink::open(&cfg.audit.db_path)
        .await
        .context("Failed to open audit database")?;

    let state = router::AppState {
        store: store.clone(),
        authorizer: Arc::new(controller),
        audit: Arc::new(audit),
        frontend: Arc::new(frontend::Frontend::new(
            &cfg.server.frontend_dir,
            &cfg.server.page_title,
        )),
        grant_minutes: cfg.controller.duration,
    };

    let cancel = CancellationToken::new();
    let sweeper = cache::spawn_sweeper(
        store,
        Duration::from_secs(cfg.cache.sweep_interval),
        Duration::from_secs(cfg.cache.max_age),
        cancel.clone(),
    );

    let addr: SocketAddr = format!("{}:{}", cfg.server.bind, cfg.server.port)
        .parse()
        .context("Invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Serving application on {}", addr);

    let served = axum::serve(listener, router::build(state))
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    // Also reached when serve fails, so the sweeper never outlives the server.
    cancel.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!("Sweeper task ended abnormally: {}", e);
    }

    served.context("HTTP server failed")?;
    tracing::info!("Shut down cleanly");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels background tasks.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown requested");
    cancel.cancel();
}
