use std::collections::BTreeSet;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The 12 bookable one-hour windows, 08:00 through 20:00. These exact
/// strings are stored on bookings and in schedule documents; slot
/// subtraction relies on bit-exact matches.
pub const SLOT_LABELS: [&str; 12] = [
    "08:00 AM - 09:00 AM",
    "09:00 AM - 10:00 AM",
    "10:00 AM - 11:00 AM",
    "11:00 AM - 12:00 PM",
    "12:00 PM - 01:00 PM",
    "01:00 PM - 02:00 PM",
    "02:00 PM - 03:00 PM",
    "03:00 PM - 04:00 PM",
    "04:00 PM - 05:00 PM",
    "05:00 PM - 06:00 PM",
    "06:00 PM - 07:00 PM",
    "07:00 PM - 08:00 PM",
];

/// Slots offered when a provider has never saved a schedule:
/// 09:00 through 18:00, Monday to Saturday.
pub const DEFAULT_SLOT_RANGE: std::ops::Range<usize> = 1..10;

pub fn canonical_index(label: &str) -> Option<usize> {
    SLOT_LABELS.iter().position(|known| *known == label)
}

/// Start of a slot as minutes since midnight, parsed from the 12-hour
/// label ("01:00 PM - ..." -> 780).
pub fn slot_start_minutes(label: &str) -> Option<u32> {
    let start = label.split(" - ").next()?;
    let (clock, meridiem) = start.split_once(' ')?;
    let (hour, minute) = clock.split_once(':')?;

    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    if hour == 0 || hour > 12 || minute > 59 {
        return None;
    }

    let hour24 = match meridiem {
        "AM" => hour % 12,
        "PM" => hour % 12 + 12,
        _ => return None,
    };

    Some(hour24 * 60 + minute)
}

/// Dedupe and order slot labels canonically; unknown labels are rejected
/// with the offending string.
pub fn normalize_slots(slots: &[String]) -> Result<Vec<String>, String> {
    let mut indices = BTreeSet::new();
    for slot in slots {
        let idx = canonical_index(slot).ok_or_else(|| slot.clone())?;
        indices.insert(idx);
    }
    Ok(indices
        .into_iter()
        .map(|idx| SLOT_LABELS[idx].to_string())
        .collect())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySchedule {
    pub is_available: bool,
    pub slots: Vec<String>,
}

impl DaySchedule {
    pub fn closed() -> Self {
        Self {
            is_available: false,
            slots: Vec::new(),
        }
    }

    fn default_open() -> Self {
        Self {
            is_available: true,
            slots: SLOT_LABELS[DEFAULT_SLOT_RANGE]
                .iter()
                .map(|slot| slot.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub monday: DaySchedule,
    pub tuesday: DaySchedule,
    pub wednesday: DaySchedule,
    pub thursday: DaySchedule,
    pub friday: DaySchedule,
    pub saturday: DaySchedule,
    pub sunday: DaySchedule,
}

impl WeeklySchedule {
    pub fn day(&self, weekday: Weekday) -> &DaySchedule {
        match weekday {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }

    pub fn days_mut(&mut self) -> [&mut DaySchedule; 7] {
        [
            &mut self.monday,
            &mut self.tuesday,
            &mut self.wednesday,
            &mut self.thursday,
            &mut self.friday,
            &mut self.saturday,
            &mut self.sunday,
        ]
    }
}

impl Default for WeeklySchedule {
    /// Business-hours default: Monday to Saturday open with the 9 default
    /// slots, Sunday closed.
    fn default() -> Self {
        Self {
            monday: DaySchedule::default_open(),
            tuesday: DaySchedule::default_open(),
            wednesday: DaySchedule::default_open(),
            thursday: DaySchedule::default_open(),
            friday: DaySchedule::default_open(),
            saturday: DaySchedule::default_open(),
            sunday: DaySchedule::closed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAvailability {
    pub provider_id: Uuid,
    pub weekly_schedule: WeeklySchedule,
    pub custom_days_off: BTreeSet<NaiveDate>,
    pub booking_buffer_min: u32,
    pub advance_booking_days: u32,
    pub is_accepting_bookings: bool,
}

impl ProviderAvailability {
    pub const DEFAULT_ADVANCE_BOOKING_DAYS: u32 = 30;

    pub fn default_for(provider_id: Uuid) -> Self {
        Self {
            provider_id,
            weekly_schedule: WeeklySchedule::default(),
            custom_days_off: BTreeSet::new(),
            booking_buffer_min: 0,
            advance_booking_days: Self::DEFAULT_ADVANCE_BOOKING_DAYS,
            is_accepting_bookings: true,
        }
    }
}
