mod api;
mod config;
mod engine;
mod error;
mod geo;
mod models;
mod observability;
mod payments;
mod state;
mod store;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let shared_state = Arc::new(state::AppState::new(config.clone()));

    let app = api::rest::router(shared_state.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = tokio::spawn(engine::sweep::run_sweep(shared_state.clone(), shutdown_rx));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    // Stop the sweep before the store goes away.
    let _ = shutdown_tx.send(true);
    if let Err(err) = sweep.await {
        tracing::error!(error = %err, "expiry sweep task failed");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
