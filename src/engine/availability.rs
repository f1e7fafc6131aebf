//! Turns a provider's weekly schedule, day-off overrides, and active
//! bookings into the list of still-bookable slots for one calendar date.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::schedule::{slot_start_minutes, ProviderAvailability};
use crate::state::AppState;

pub const REASON_PAST_DATE: &str = "past date";
pub const REASON_TOO_FAR: &str = "too far in advance";
pub const REASON_DEFAULT_SCHEDULE: &str = "default schedule";
pub const REASON_NOT_ACCEPTING: &str = "provider is not accepting bookings";
pub const REASON_DAY_OFF: &str = "day off";
pub const REASON_DAY_UNAVAILABLE: &str = "not available on this day";
pub const REASON_NO_SLOTS: &str = "no slots available";

#[derive(Debug, Clone, Serialize)]
pub struct SlotAvailability {
    pub is_available: bool,
    pub slots: Vec<String>,
    pub reason: Option<String>,
}

impl SlotAvailability {
    fn unavailable(reason: &str) -> Self {
        Self {
            is_available: false,
            slots: Vec::new(),
            reason: Some(reason.to_string()),
        }
    }
}

/// Date-window guard shared by slot queries and booking creation. The
/// comparison is calendar-day granular; today always passes.
pub fn check_booking_window(
    date: NaiveDate,
    today: NaiveDate,
    advance_booking_days: u32,
) -> Result<(), &'static str> {
    if date < today {
        return Err(REASON_PAST_DATE);
    }
    if (date - today).num_days() > i64::from(advance_booking_days) {
        return Err(REASON_TOO_FAR);
    }
    Ok(())
}

pub fn get_available_slots(
    state: &AppState,
    provider_id: Uuid,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> SlotAvailability {
    let timer = state.metrics.slot_query_seconds.start_timer();
    let result = compute_slots(state, provider_id, date, now);
    timer.observe_duration();
    result
}

fn compute_slots(
    state: &AppState,
    provider_id: Uuid,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> SlotAvailability {
    let today = now.date_naive();
    let record = state
        .availability
        .get(&provider_id)
        .map(|r| r.value().clone());

    let advance_days = record
        .as_ref()
        .map(|r| r.advance_booking_days)
        .unwrap_or(ProviderAvailability::DEFAULT_ADVANCE_BOOKING_DAYS);
    if let Err(reason) = check_booking_window(date, today, advance_days) {
        return SlotAvailability::unavailable(reason);
    }

    let using_default = record.is_none();
    let record = record.unwrap_or_else(|| ProviderAvailability::default_for(provider_id));

    if !record.is_accepting_bookings {
        return SlotAvailability::unavailable(REASON_NOT_ACCEPTING);
    }
    if record.custom_days_off.contains(&date) {
        return SlotAvailability::unavailable(REASON_DAY_OFF);
    }

    let day = record.weekly_schedule.day(date.weekday());
    if !day.is_available || day.slots.is_empty() {
        return SlotAvailability::unavailable(REASON_DAY_UNAVAILABLE);
    }

    // Subtract every slot held by a non-terminal booking on this exact
    // provider/date pair. Canonical order is preserved because the day's
    // configured slots are stored canonically.
    let booked = state.booked_slots_for(provider_id, date);
    let mut slots: Vec<String> = day
        .slots
        .iter()
        .filter(|slot| !booked.contains(*slot))
        .cloned()
        .collect();

    if date == today {
        let now_minutes = now.hour() * 60 + now.minute();
        slots.retain(|slot| slot_start_minutes(slot).is_some_and(|start| start > now_minutes));
    }

    let is_available = !slots.is_empty();
    let reason = if !is_available {
        Some(REASON_NO_SLOTS.to_string())
    } else if using_default {
        Some(REASON_DEFAULT_SCHEDULE.to_string())
    } else {
        None
    };

    SlotAvailability {
        is_available,
        slots,
        reason,
    }
}
