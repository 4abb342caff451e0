//! `capvault` server entry point.
//!
//! Opens the record snapshot and the session database, builds the shared
//! state, then starts the Axum HTTP server with graceful shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use capvault_core::capability::CapabilityStore;
use capvault_core::directory::CompanyDirectory;
use capvault_core::quota::QuotaGuard;
use capvault_core::session::SessionLedger;
use capvault_storage::{FileBackend, SnapshotBackend};

use capvault_server::config::ServerConfig;
use capvault_server::routes;
use capvault_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment.
    let config = ServerConfig::from_env();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    for (name, value) in &config.rejected {
        warn!(variable = *name, value = %value, "ignoring unparsable setting, using default");
    }

    info!(
        store = %config.store_path.display(),
        sessions = %config.session_db.display(),
        quota_mode = ?config.quota_mode,
        "capvault starting"
    );

    let state = build_app_state(&config).await?;
    let app = routes::build_router(state);

    // Bind and serve.
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "capvault server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("capvault server stopped");
    Ok(())
}

/// Open the stores and build the shared application state.
async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let backend: Arc<dyn SnapshotBackend> = Arc::new(
        FileBackend::open(&config.store_path)
            .await
            .context("failed to open record snapshot")?,
    );
    let capabilities = Arc::new(
        CapabilityStore::open(backend)
            .await
            .context("failed to load capability store")?,
    );

    if let Some(parent) = config.session_db.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let sessions = SessionLedger::connect(&config.session_db)
        .await
        .context("failed to open session database")?;

    let directory = CompanyDirectory::new(sessions.pool().clone());
    directory
        .migrate()
        .await
        .context("failed to prepare company directory")?;

    let quota = QuotaGuard::new(Arc::clone(&capabilities), config.quota_mode);

    Ok(Arc::new(AppState::new(capabilities, quota, sessions, directory)))
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
