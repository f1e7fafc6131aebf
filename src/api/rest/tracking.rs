use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::booking::BookingStatus;
use crate::models::tracking::{GeoPoint, TrackingSnapshot};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking/:booking_id/start", post(start_tracking))
        .route("/tracking/:booking_id/location", post(ingest_location))
        .route("/tracking/:booking_id/stop", post(stop_tracking))
        .route("/tracking/:booking_id", get(get_tracking))
}

#[derive(Deserialize)]
pub struct LocationSampleRequest {
    pub lat: f64,
    pub lng: f64,
    pub recorded_at: Option<DateTime<Utc>>,
}

async fn start_tracking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let booking = state
        .bookings
        .get(&booking_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("booking {} not found", booking_id)))?;

    if !matches!(
        booking.status,
        BookingStatus::OnTheWay | BookingStatus::InProgress
    ) {
        return Err(AppError::Conflict(format!(
            "tracking requires an on-the-way or in-progress booking, not {}",
            booking.status
        )));
    }

    let provider_name = state
        .providers
        .get(&booking.provider_id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| "provider".to_string());

    state.tracker.start(&booking, provider_name)?;
    Ok(StatusCode::CREATED)
}

async fn ingest_location(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<LocationSampleRequest>,
) -> Result<StatusCode, AppError> {
    let location = GeoPoint {
        lat: payload.lat,
        lng: payload.lng,
    };
    let recorded_at = payload.recorded_at.unwrap_or_else(Utc::now);

    state
        .tracker
        .ingest(booking_id, location, recorded_at)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn get_tracking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<TrackingSnapshot>, AppError> {
    let snapshot = state.tracker.snapshot(booking_id).await?;
    Ok(Json(snapshot))
}

async fn stop_tracking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.tracker.stop(booking_id).await {
        return Err(AppError::NotFound(format!(
            "tracking not active for booking {booking_id}"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}
