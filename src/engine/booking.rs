//! Booking lifecycle state machine. Every status change flows through
//! `apply_transition`: the table below is the only source of legal moves,
//! and each applied transition notifies the counterpart party and
//! publishes a booking event. Side-effect failures (notification,
//! completed-jobs counter) are logged and never roll back the booking.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::availability::{
    get_available_slots, REASON_PAST_DATE, REASON_TOO_FAR,
};
use crate::error::AppError;
use crate::models::booking::{Actor, Address, Booking, BookingEvent, BookingStatus};
use crate::models::schedule::canonical_index;
use crate::notify::{Notification, NotificationEvent, Recipient};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NewBookingRequest {
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_slot: String,
    pub address: Address,
    pub price: f64,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: BookingStatus,
    pub actor: Actor,
    pub reason: Option<String>,
}

/// The legal transition table. Cancellation is reachable from pending and
/// accepted only; on-the-way and in-progress bookings are not cancellable.
pub fn transition_allowed(from: BookingStatus, to: BookingStatus, actor: Actor) -> bool {
    use BookingStatus::*;

    match (from, to) {
        (Pending, Accepted) | (Pending, Rejected) => actor == Actor::Provider,
        (Accepted, OnTheWay) | (OnTheWay, InProgress) | (InProgress, Completed) => {
            actor == Actor::Provider
        }
        (Pending, Cancelled) | (Accepted, Cancelled) => true,
        _ => false,
    }
}

fn requires_reason(to: BookingStatus) -> bool {
    matches!(to, BookingStatus::Cancelled | BookingStatus::Rejected)
}

fn notification_event(to: BookingStatus) -> NotificationEvent {
    match to {
        BookingStatus::Accepted => NotificationEvent::BookingAccepted,
        BookingStatus::Rejected => NotificationEvent::BookingRejected,
        BookingStatus::Cancelled => NotificationEvent::BookingCancelled,
        BookingStatus::OnTheWay => NotificationEvent::ProviderOnTheWay,
        BookingStatus::InProgress => NotificationEvent::JobStarted,
        BookingStatus::Completed => NotificationEvent::JobCompleted,
        // No transition targets pending; creation sends this directly.
        BookingStatus::Pending => NotificationEvent::BookingRequested,
    }
}

pub async fn create_booking(
    state: &AppState,
    request: NewBookingRequest,
    now: DateTime<Utc>,
) -> Result<Booking, AppError> {
    if request.service_name.trim().is_empty() {
        return Err(AppError::BadRequest(
            "service name cannot be empty".to_string(),
        ));
    }
    if canonical_index(&request.scheduled_slot).is_none() {
        return Err(AppError::BadRequest(format!(
            "unknown slot label {:?}",
            request.scheduled_slot
        )));
    }
    if !state.customers.contains_key(&request.customer_id) {
        return Err(AppError::NotFound(format!(
            "customer {} not found",
            request.customer_id
        )));
    }
    if !state.providers.contains_key(&request.provider_id) {
        return Err(AppError::NotFound(format!(
            "provider {} not found",
            request.provider_id
        )));
    }

    let availability = get_available_slots(state, request.provider_id, request.scheduled_date, now);
    if !availability.is_available {
        let reason = availability
            .reason
            .unwrap_or_else(|| "provider unavailable".to_string());
        return Err(match reason.as_str() {
            REASON_PAST_DATE | REASON_TOO_FAR => AppError::BadRequest(reason),
            _ => AppError::Conflict(reason),
        });
    }
    if !availability.slots.contains(&request.scheduled_slot) {
        return Err(AppError::Conflict(format!(
            "slot {:?} is not available on {}",
            request.scheduled_slot, request.scheduled_date
        )));
    }

    let booking = Booking {
        id: Uuid::new_v4(),
        customer_id: request.customer_id,
        provider_id: request.provider_id,
        service_id: request.service_id,
        service_name: request.service_name,
        status: BookingStatus::Pending,
        scheduled_date: request.scheduled_date,
        scheduled_slot: request.scheduled_slot,
        address: request.address,
        price: request.price,
        cancellation_reason: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };
    state.insert_booking(booking.clone());

    info!(
        booking_id = %booking.id,
        provider_id = %booking.provider_id,
        date = %booking.scheduled_date,
        slot = %booking.scheduled_slot,
        "booking created"
    );

    notify_counterpart(
        state,
        &booking,
        Actor::Customer,
        NotificationEvent::BookingRequested,
        now,
    )
    .await;
    publish_event(state, &booking, Actor::Customer, now);

    Ok(booking)
}

pub async fn apply_transition(
    state: &AppState,
    booking_id: Uuid,
    request: TransitionRequest,
    now: DateTime<Utc>,
) -> Result<Booking, AppError> {
    let reason = request
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    if requires_reason(request.status) && reason.is_none() {
        return Err(AppError::BadRequest(format!(
            "a non-empty reason is required to mark a booking {}",
            request.status
        )));
    }

    // Read-modify-write under the booking's entry lock: a racing
    // transition observes the winner's status and fails the table check.
    let (previous, updated) = {
        let mut booking = state
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id} not found")))?;

        let previous = booking.status;
        if !transition_allowed(previous, request.status, request.actor) {
            state
                .metrics
                .booking_transitions_total
                .with_label_values(&[request.status.as_str(), "rejected"])
                .inc();
            return Err(AppError::IllegalTransition {
                from: previous,
                to: request.status,
            });
        }

        booking.status = request.status;
        booking.updated_at = now;
        if requires_reason(request.status) {
            booking.cancellation_reason = reason;
        }
        if request.status == BookingStatus::Completed {
            booking.completed_at = Some(now);
        }

        (previous, booking.clone())
    };

    state
        .metrics
        .booking_transitions_total
        .with_label_values(&[request.status.as_str(), "applied"])
        .inc();
    info!(
        booking_id = %updated.id,
        from = %previous,
        to = %updated.status,
        actor = ?request.actor,
        "booking transition applied"
    );

    if updated.status == BookingStatus::Completed {
        bump_completed_jobs(state, updated.provider_id);
    }
    if updated.status.is_terminal() {
        state.tracker.stop(updated.id).await;
    }

    notify_counterpart(
        state,
        &updated,
        request.actor,
        notification_event(updated.status),
        now,
    )
    .await;
    publish_event(state, &updated, request.actor, now);

    Ok(updated)
}

/// Best-effort counter bump; completion must succeed even if this fails.
fn bump_completed_jobs(state: &AppState, provider_id: Uuid) {
    match state.providers.get_mut(&provider_id) {
        Some(mut provider) => {
            provider.completed_jobs = provider.completed_jobs.saturating_add(1);
        }
        None => {
            warn!(provider_id = %provider_id, "completed-jobs counter skipped: provider record missing");
        }
    }
}

async fn notify_counterpart(
    state: &AppState,
    booking: &Booking,
    actor: Actor,
    event: NotificationEvent,
    sent_at: DateTime<Utc>,
) {
    let (recipient, actor_name) = match actor {
        Actor::Customer => (
            Recipient::Provider(booking.provider_id),
            state
                .customers
                .get(&booking.customer_id)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| "customer".to_string()),
        ),
        Actor::Provider => (
            Recipient::Customer(booking.customer_id),
            state
                .providers
                .get(&booking.provider_id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| "provider".to_string()),
        ),
    };

    let notification = Notification {
        recipient,
        booking_id: booking.id,
        event,
        actor_name,
        service_name: booking.service_name.clone(),
        sent_at,
    };

    match state.notifier.send(notification).await {
        Ok(()) => state
            .metrics
            .notifications_total
            .with_label_values(&["sent"])
            .inc(),
        Err(err) => {
            state
                .metrics
                .notifications_total
                .with_label_values(&["error"])
                .inc();
            warn!(booking_id = %booking.id, error = %err, "notification dispatch failed");
        }
    }
}

fn publish_event(state: &AppState, booking: &Booking, actor: Actor, occurred_at: DateTime<Utc>) {
    let _ = state.booking_events_tx.send(BookingEvent {
        booking_id: booking.id,
        customer_id: booking.customer_id,
        provider_id: booking.provider_id,
        status: booking.status,
        actor,
        occurred_at,
    });
}
