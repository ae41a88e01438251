mod config;
mod sweeper;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use denuncia_api::router;
use denuncia_api::state::{AppState, AppStateInner};
use denuncia_db::Database;

use crate::config::Config;

/// How often expired rate-limit windows are evicted.
const SWEEP_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "denuncia=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path, config.storage_timeout)?);

    let state: AppState = Arc::new(AppStateInner::new(
        db.clone(),
        config.environment,
        config.storage_timeout,
    ));

    // Background eviction of stale rate-limit windows
    let (sweep_tx, sweep_rx) = watch::channel(false);
    let sweeper = tokio::spawn(sweeper::run_sweep_loop(
        vec![state.general_limiter.clone(), state.submission_limiter.clone()],
        SWEEP_INTERVAL_SECS,
        sweep_rx,
    ));

    let app = router::build(state, config.frontend_origin.clone());

    info!("Denuncia server listening on {}", config.addr);
    info!("Environment: {}", config.environment.as_str());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = sweep_tx.send(true);
    sweeper.await.ok();

    // Every request has finished; the router and its state are gone, so this
    // should be the last handle to the database.
    match Arc::try_unwrap(db) {
        Ok(db) => db.close()?,
        Err(_) => warn!("Database still in use at shutdown, dropping without explicit close"),
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
