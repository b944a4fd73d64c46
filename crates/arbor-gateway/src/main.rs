use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use arbor_cards::{db::init_db, CardStore};
use arbor_core::config::ArborConfig;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

mod app;
mod error;
mod http;

#[derive(Debug, Parser)]
#[command(name = "arbor-gateway", version, about = "Spaced-repetition flashcard service")]
struct Cli {
    /// Path to arbor.toml. Falls back to ARBOR_CONFIG, then ~/.arbor/arbor.toml.
    #[arg(long, short)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbor_gateway=info,arbor_cards=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    // explicit path > ARBOR_CONFIG env > ~/.arbor/arbor.toml
    let config_path = cli.config.or_else(|| std::env::var("ARBOR_CONFIG").ok());
    let config = ArborConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        ArborConfig::default()
    });

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(&db_path)
        .with_context(|| format!("cannot open database at {db_path}"))?;
    db.execute_batch("PRAGMA journal_mode=WAL;")?;
    init_db(&db)?;
    info!("database migrations complete");

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port)
        .parse()
        .context("invalid gateway bind address")?;

    let state = Arc::new(app::AppState::new(config, CardStore::new(db)));
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Arbor gateway listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

/// Resolves on Ctrl-C (and SIGTERM on unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
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
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
