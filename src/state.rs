use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::directions::DirectionsProvider;
use crate::engine::tracking::{TrackerRegistry, TrackerSettings};
use crate::models::booking::{Booking, BookingEvent, BookingStatus};
use crate::models::party::{Customer, Provider};
use crate::models::schedule::ProviderAvailability;
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub customers: DashMap<Uuid, Customer>,
    pub providers: DashMap<Uuid, Provider>,
    pub availability: DashMap<Uuid, ProviderAvailability>,
    pub bookings: DashMap<Uuid, Booking>,
    day_index: DashMap<(Uuid, NaiveDate), Vec<Uuid>>,
    pub booking_events_tx: broadcast::Sender<BookingEvent>,
    pub tracker: TrackerRegistry,
    pub notifier: Arc<dyn Notifier>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        event_buffer_size: usize,
        tracker_settings: TrackerSettings,
        directions: Arc<dyn DirectionsProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (booking_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);
        let metrics = Metrics::new();
        let tracker = TrackerRegistry::new(
            directions,
            notifier.clone(),
            metrics.clone(),
            tracker_settings,
        );

        Self {
            customers: DashMap::new(),
            providers: DashMap::new(),
            availability: DashMap::new(),
            bookings: DashMap::new(),
            day_index: DashMap::new(),
            booking_events_tx,
            tracker,
            notifier,
            metrics,
        }
    }

    /// Store a new booking and index it under its provider/date pair.
    pub fn insert_booking(&self, booking: Booking) {
        self.day_index
            .entry((booking.provider_id, booking.scheduled_date))
            .or_default()
            .push(booking.id);
        self.bookings.insert(booking.id, booking);
    }

    /// Slot labels held by non-terminal bookings for one provider/date
    /// pair, served from the day index.
    pub fn booked_slots_for(&self, provider_id: Uuid, date: NaiveDate) -> HashSet<String> {
        let Some(ids) = self.day_index.get(&(provider_id, date)) else {
            return HashSet::new();
        };

        ids.iter()
            .filter_map(|id| self.bookings.get(id))
            .filter(|booking| !booking.status.is_terminal())
            .map(|booking| booking.scheduled_slot.clone())
            .collect()
    }

    pub fn bookings_for(&self, party: PartyRef) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|entry| party.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Badge counts, computed as one counting pass per status.
    pub fn booking_counts(&self, party: PartyRef) -> BookingCounts {
        let count_for = |status: BookingStatus| {
            self.bookings
                .iter()
                .filter(|entry| {
                    let booking = entry.value();
                    party.matches(booking) && booking.status == status
                })
                .count()
        };

        let pending = count_for(BookingStatus::Pending);
        let accepted = count_for(BookingStatus::Accepted);
        let on_the_way = count_for(BookingStatus::OnTheWay);
        let in_progress = count_for(BookingStatus::InProgress);
        let completed = count_for(BookingStatus::Completed);
        let cancelled = count_for(BookingStatus::Cancelled);
        let rejected = count_for(BookingStatus::Rejected);

        BookingCounts {
            pending,
            accepted,
            on_the_way,
            in_progress,
            completed,
            cancelled,
            rejected,
            total: pending + accepted + on_the_way + in_progress + completed + cancelled + rejected,
        }
    }

    pub fn subscribe_booking_events(&self) -> BroadcastStream<BookingEvent> {
        BroadcastStream::new(self.booking_events_tx.subscribe())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PartyRef {
    Customer(Uuid),
    Provider(Uuid),
}

impl PartyRef {
    fn matches(&self, booking: &Booking) -> bool {
        match self {
            PartyRef::Customer(id) => booking.customer_id == *id,
            PartyRef::Provider(id) => booking.provider_id == *id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingCounts {
    pub pending: usize,
    pub accepted: usize,
    #[serde(rename = "on-the-way")]
    pub on_the_way: usize,
    #[serde(rename = "in-progress")]
    pub in_progress: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub rejected: usize,
    pub total: usize,
}

#[cfg(test)]
impl AppState {
    pub(crate) fn for_tests() -> Self {
        Self::for_tests_with(Arc::new(crate::notify::LogNotifier))
    }

    pub(crate) fn for_tests_with(notifier: Arc<dyn Notifier>) -> Self {
        use crate::directions::{DirectionsError, RouteSummary};
        use crate::models::tracking::GeoPoint;

        struct UnreachableDirections;

        #[async_trait::async_trait]
        impl DirectionsProvider for UnreachableDirections {
            async fn route(
                &self,
                _origin: GeoPoint,
                _destination: GeoPoint,
            ) -> Result<RouteSummary, DirectionsError> {
                Err(DirectionsError::Transport("no directions in tests".to_string()))
            }
        }

        Self::new(
            16,
            TrackerSettings::default(),
            Arc::new(UnreachableDirections),
            notifier,
        )
    }
}
