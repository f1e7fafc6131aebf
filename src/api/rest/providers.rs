use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::availability::{get_available_slots, SlotAvailability};
use crate::error::AppError;
use crate::models::party::{Customer, Provider};
use crate::models::schedule::{normalize_slots, ProviderAvailability, WeeklySchedule};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/customers", post(create_customer))
        .route("/providers", post(create_provider).get(list_providers))
        .route(
            "/providers/:id/availability",
            get(get_availability).put(put_availability),
        )
        .route("/providers/:id/slots", get(get_slots))
}

#[derive(Deserialize)]
pub struct RegisterPartyRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub weekly_schedule: WeeklySchedule,
    #[serde(default)]
    pub custom_days_off: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub booking_buffer_min: u32,
    #[serde(default = "default_advance_days")]
    pub advance_booking_days: u32,
    #[serde(default = "default_accepting")]
    pub is_accepting_bookings: bool,
}

fn default_advance_days() -> u32 {
    ProviderAvailability::DEFAULT_ADVANCE_BOOKING_DAYS
}

fn default_accepting() -> bool {
    true
}

#[derive(Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

async fn create_customer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPartyRequest>,
) -> Result<Json<Customer>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let customer = Customer {
        id: Uuid::new_v4(),
        name: payload.name,
        created_at: Utc::now(),
    };

    state.customers.insert(customer.id, customer.clone());
    Ok(Json(customer))
}

async fn create_provider(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPartyRequest>,
) -> Result<Json<Provider>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let provider = Provider {
        id: Uuid::new_v4(),
        name: payload.name,
        completed_jobs: 0,
        created_at: Utc::now(),
    };

    state.providers.insert(provider.id, provider.clone());
    Ok(Json(provider))
}

async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Vec<Provider>> {
    let providers = state
        .providers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(providers)
}

/// The availability document is created lazily with the default schedule
/// the first time it is read.
async fn get_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProviderAvailability>, AppError> {
    if !state.providers.contains_key(&id) {
        return Err(AppError::NotFound(format!("provider {} not found", id)));
    }

    let record = state
        .availability
        .entry(id)
        .or_insert_with(|| ProviderAvailability::default_for(id))
        .clone();
    Ok(Json(record))
}

async fn put_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<ProviderAvailability>, AppError> {
    if !state.providers.contains_key(&id) {
        return Err(AppError::NotFound(format!("provider {} not found", id)));
    }

    let mut weekly_schedule = payload.weekly_schedule;
    for day in weekly_schedule.days_mut() {
        day.slots = normalize_slots(&day.slots)
            .map_err(|label| AppError::BadRequest(format!("unknown slot label {label:?}")))?;
    }

    let record = ProviderAvailability {
        provider_id: id,
        weekly_schedule,
        custom_days_off: payload.custom_days_off,
        booking_buffer_min: payload.booking_buffer_min,
        advance_booking_days: payload.advance_booking_days,
        is_accepting_bookings: payload.is_accepting_bookings,
    };

    state.availability.insert(id, record.clone());
    Ok(Json(record))
}

async fn get_slots(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<SlotsQuery>,
) -> Json<SlotAvailability> {
    Json(get_available_slots(&state, id, query.date, Utc::now()))
}
