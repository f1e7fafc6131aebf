use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::booking::{self, NewBookingRequest, TransitionRequest};
use crate::error::AppError;
use crate::models::booking::Booking;
use crate::state::{AppState, BookingCounts, PartyRef};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/counts", get(booking_counts))
        .route("/bookings/:id", get(get_booking))
        .route("/bookings/:id/status", patch(update_booking_status))
}

#[derive(Deserialize)]
pub struct PartyQuery {
    pub customer_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
}

impl PartyQuery {
    fn into_party(self) -> Result<PartyRef, AppError> {
        match (self.customer_id, self.provider_id) {
            (Some(id), None) => Ok(PartyRef::Customer(id)),
            (None, Some(id)) => Ok(PartyRef::Provider(id)),
            _ => Err(AppError::BadRequest(
                "exactly one of customer_id or provider_id is required".to_string(),
            )),
        }
    }
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = booking::create_booking(&state, payload, Utc::now()).await?;
    Ok(Json(booking))
}

async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .bookings
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("booking {} not found", id)))?;

    Ok(Json(booking.value().clone()))
}

async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PartyQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let party = query.into_party()?;
    let mut bookings = state.bookings_for(party);
    bookings.sort_by_key(|booking| std::cmp::Reverse(booking.created_at));
    Ok(Json(bookings))
}

async fn booking_counts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PartyQuery>,
) -> Result<Json<BookingCounts>, AppError> {
    let party = query.into_party()?;
    Ok(Json(state.booking_counts(party)))
}

async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<Json<Booking>, AppError> {
    let booking = booking::apply_transition(&state, id, payload, Utc::now()).await?;
    Ok(Json(booking))
}
