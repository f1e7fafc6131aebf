mod api;
mod config;
mod directions;
mod engine;
mod error;
mod geo;
mod models;
mod notify;
mod observability;
mod state;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::engine::tracking::TrackerSettings;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let directions = Arc::new(directions::HttpDirections::new(
        config.directions_base_url.clone(),
        config.directions_api_key.clone(),
    ));
    let notifier = Arc::new(notify::LogNotifier);

    let tracker_settings = TrackerSettings {
        geofence_radius_m: config.geofence_radius_m,
        sample_queue_size: config.sample_queue_size,
        update_buffer_size: config.event_buffer_size,
    };
    let app_state = state::AppState::new(
        config.event_buffer_size,
        tracker_settings,
        directions,
        notifier,
    );
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| error::AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| error::AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
