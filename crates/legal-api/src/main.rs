//! # legal-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the legalization registry.
//! Binds to the configured port (default 8080).

use std::time::Duration;

use legal_api::config::AppConfig;
use legal_api::state::AppState;
use legal_api::store::bounded;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Configuration error: {e}");
        e
    })?;
    let port = config.port;
    tracing::info!(
        base_url = %config.base_url,
        qr_storage_dir = %config.qr_storage_dir.display(),
        "configuration loaded"
    );

    let state = legal_api::bootstrap::bootstrap(config).await.map_err(|e| {
        tracing::error!("Bootstrap failed: {e}");
        e
    })?;

    tokio::spawn(purge_sessions(state.clone()));

    let app = legal_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Legalization registry listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Periodically drop expired sessions.
async fn purge_sessions(state: AppState) {
    let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
    loop {
        ticker.tick().await;
        let now = chrono::Utc::now();
        match bounded(
            state.storage_timeout(),
            state.stores.sessions.purge_expired(now),
        )
        .await
        {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "expired sessions purged"),
            Err(e) => tracing::warn!(error = %e, "session purge failed"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
