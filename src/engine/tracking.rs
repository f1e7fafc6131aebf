//! Live location tracking. Each actively tracked booking gets one actor
//! task that owns all session state and processes messages in arrival
//! order; raw samples, route-fetch results, and snapshot requests are
//! serialized through its inbox. Route lookups run detached so a slow
//! directions call never blocks sample ingestion.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::directions::{DirectionsError, DirectionsProvider, RouteSummary};
use crate::error::AppError;
use crate::geo::{self, polyline};
use crate::models::booking::Booking;
use crate::models::tracking::{GeoPoint, TrackingSnapshot, TrackingUpdate};
use crate::notify::{Notification, NotificationEvent, Notifier, Recipient};
use crate::observability::metrics::Metrics;

/// Minimum movement before a sample extends the travel path.
const PATH_MIN_STEP_M: f64 = 5.0;
/// Travel path cap; oldest points are dropped first.
const PATH_CAP: usize = 100;
/// No route lookups once the provider is practically at the doorstep.
const ROUTE_FETCH_MIN_DISTANCE_M: f64 = 10.0;
/// Movement since the last lookup that forces a refresh.
const ROUTE_FETCH_MOVE_M: f64 = 50.0;
/// Age of the last lookup that forces a refresh.
const ROUTE_FETCH_INTERVAL_S: i64 = 15;
/// Average speed assumed when falling back to straight-line estimates.
const FALLBACK_SPEED_KMH: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub geofence_radius_m: f64,
    pub sample_queue_size: usize,
    pub update_buffer_size: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            geofence_radius_m: 50.0,
            sample_queue_size: 256,
            update_buffer_size: 64,
        }
    }
}

enum SessionMsg {
    Sample {
        location: GeoPoint,
        recorded_at: DateTime<Utc>,
    },
    RouteResult {
        result: Result<RouteSummary, DirectionsError>,
        immediate_m: f64,
        requested_at: DateTime<Utc>,
    },
    Snapshot(oneshot::Sender<TrackingSnapshot>),
    Stop,
}

struct SessionHandle {
    tx: mpsc::Sender<SessionMsg>,
    updates: broadcast::Sender<TrackingUpdate>,
}

#[derive(Clone)]
struct SessionDeps {
    directions: Arc<dyn DirectionsProvider>,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
}

/// Registry of active sessions, keyed by booking id. At most one session
/// exists per booking.
pub struct TrackerRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
    directions: Arc<dyn DirectionsProvider>,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
    settings: TrackerSettings,
}

impl TrackerRegistry {
    pub fn new(
        directions: Arc<dyn DirectionsProvider>,
        notifier: Arc<dyn Notifier>,
        metrics: Metrics,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            directions,
            notifier,
            metrics,
            settings,
        }
    }

    pub fn start(&self, booking: &Booking, provider_name: String) -> Result<(), AppError> {
        match self.sessions.entry(booking.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "tracking already active for booking {}",
                booking.id
            ))),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(self.settings.sample_queue_size);
                let (updates, _unused_rx) = broadcast::channel(self.settings.update_buffer_size);
                let session = SessionState::from_booking(
                    booking,
                    provider_name,
                    self.settings.geofence_radius_m,
                    Utc::now(),
                );
                let deps = SessionDeps {
                    directions: self.directions.clone(),
                    notifier: self.notifier.clone(),
                    metrics: self.metrics.clone(),
                };

                tokio::spawn(run_session(session, rx, tx.clone(), updates.clone(), deps));
                slot.insert(SessionHandle { tx, updates });
                self.metrics.active_tracking_sessions.inc();
                Ok(())
            }
        }
    }

    pub async fn ingest(
        &self,
        booking_id: Uuid,
        location: GeoPoint,
        recorded_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let tx = self.sender_for(booking_id)?;
        tx.send(SessionMsg::Sample {
            location,
            recorded_at,
        })
        .await
        .map_err(|_| inactive(booking_id))
    }

    pub async fn snapshot(&self, booking_id: Uuid) -> Result<TrackingSnapshot, AppError> {
        let tx = self.sender_for(booking_id)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(SessionMsg::Snapshot(reply_tx))
            .await
            .map_err(|_| inactive(booking_id))?;
        reply_rx.await.map_err(|_| inactive(booking_id))
    }

    pub fn subscribe(&self, booking_id: Uuid) -> Result<BroadcastStream<TrackingUpdate>, AppError> {
        let handle = self
            .sessions
            .get(&booking_id)
            .ok_or_else(|| inactive(booking_id))?;
        Ok(BroadcastStream::new(handle.updates.subscribe()))
    }

    /// Stop and remove a session. Returns false if none was active.
    pub async fn stop(&self, booking_id: Uuid) -> bool {
        match self.sessions.remove(&booking_id) {
            Some((_, handle)) => {
                let _ = handle.tx.send(SessionMsg::Stop).await;
                self.metrics.active_tracking_sessions.dec();
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    fn sender_for(&self, booking_id: Uuid) -> Result<mpsc::Sender<SessionMsg>, AppError> {
        let handle = self
            .sessions
            .get(&booking_id)
            .ok_or_else(|| inactive(booking_id))?;
        Ok(handle.tx.clone())
    }
}

fn inactive(booking_id: Uuid) -> AppError {
    AppError::NotFound(format!("tracking not active for booking {booking_id}"))
}

async fn run_session(
    mut session: SessionState,
    mut rx: mpsc::Receiver<SessionMsg>,
    self_tx: mpsc::Sender<SessionMsg>,
    updates: broadcast::Sender<TrackingUpdate>,
    deps: SessionDeps,
) {
    info!(booking_id = %session.booking_id, "tracking session started");

    while let Some(msg) = rx.recv().await {
        match msg {
            SessionMsg::Sample {
                location,
                recorded_at,
            } => {
                let outcome = session.ingest(location, recorded_at);

                if let Some(plan) = outcome.fetch {
                    spawn_route_fetch(deps.directions.clone(), self_tx.clone(), plan);
                }

                if outcome.arrived_now {
                    send_notification(&deps, session.arrival_notification(Utc::now())).await;
                }

                let _ = updates.send(outcome.update);
            }
            SessionMsg::RouteResult {
                result,
                immediate_m,
                requested_at,
            } => {
                let (update, outcome) =
                    session.apply_route_result(result, immediate_m, requested_at);
                deps.metrics
                    .route_fetches_total
                    .with_label_values(&[outcome])
                    .inc();
                let _ = updates.send(update);
            }
            SessionMsg::Snapshot(reply) => {
                let _ = reply.send(session.snapshot());
            }
            SessionMsg::Stop => break,
        }
    }

    info!(booking_id = %session.booking_id, "tracking session stopped");
}

fn spawn_route_fetch(
    directions: Arc<dyn DirectionsProvider>,
    tx: mpsc::Sender<SessionMsg>,
    plan: FetchPlan,
) {
    tokio::spawn(async move {
        let result = directions.route(plan.origin, plan.destination).await;
        let _ = tx
            .send(SessionMsg::RouteResult {
                result,
                immediate_m: plan.immediate_m,
                requested_at: plan.requested_at,
            })
            .await;
    });
}

async fn send_notification(deps: &SessionDeps, notification: Notification) {
    let booking_id = notification.booking_id;
    match deps.notifier.send(notification).await {
        Ok(()) => deps
            .metrics
            .notifications_total
            .with_label_values(&["sent"])
            .inc(),
        Err(err) => {
            deps.metrics
                .notifications_total
                .with_label_values(&["error"])
                .inc();
            warn!(booking_id = %booking_id, error = %err, "arrival notification failed");
        }
    }
}

struct FetchMark {
    at: DateTime<Utc>,
    location: GeoPoint,
}

struct FetchPlan {
    origin: GeoPoint,
    destination: GeoPoint,
    immediate_m: f64,
    requested_at: DateTime<Utc>,
}

struct SampleOutcome {
    fetch: Option<FetchPlan>,
    arrived_now: bool,
    update: TrackingUpdate,
}

struct SessionState {
    booking_id: Uuid,
    provider_id: Uuid,
    customer_id: Uuid,
    provider_name: String,
    service_name: String,
    customer: GeoPoint,
    geofence_radius_m: f64,
    current: Option<GeoPoint>,
    last_sample_at: Option<DateTime<Utc>>,
    travel_path: Vec<GeoPoint>,
    route: Vec<GeoPoint>,
    distance_m: f64,
    duration_s: f64,
    eta: Option<DateTime<Utc>>,
    has_arrived: bool,
    last_fetch: Option<FetchMark>,
    fetch_in_flight: bool,
    started_at: DateTime<Utc>,
}

impl SessionState {
    fn from_booking(
        booking: &Booking,
        provider_name: String,
        geofence_radius_m: f64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            booking_id: booking.id,
            provider_id: booking.provider_id,
            customer_id: booking.customer_id,
            provider_name,
            service_name: booking.service_name.clone(),
            customer: GeoPoint {
                lat: booking.address.lat,
                lng: booking.address.lng,
            },
            geofence_radius_m,
            current: None,
            last_sample_at: None,
            travel_path: Vec::new(),
            route: Vec::new(),
            distance_m: 0.0,
            duration_s: 0.0,
            eta: None,
            has_arrived: false,
            last_fetch: None,
            fetch_in_flight: false,
            started_at,
        }
    }

    fn ingest(&mut self, location: GeoPoint, recorded_at: DateTime<Utc>) -> SampleOutcome {
        self.current = Some(location);
        self.last_sample_at = Some(recorded_at);

        let extend_path = match self.travel_path.last() {
            Some(last) => geo::haversine_m(last, &location) > PATH_MIN_STEP_M,
            None => true,
        };
        if extend_path {
            if self.travel_path.len() == PATH_CAP {
                self.travel_path.remove(0);
            }
            self.travel_path.push(location);
        }

        // A zero reading is a transient bad sample; keep the last known
        // non-zero distance.
        let immediate = geo::haversine_m(&location, &self.customer);
        if immediate > 0.0 {
            self.distance_m = immediate;
        }

        let fetch = self.plan_route_fetch(location, immediate, recorded_at);

        let arrived_now = !self.has_arrived
            && geo::within_radius(&location, &self.customer, self.geofence_radius_m);
        if arrived_now {
            self.has_arrived = true;
        }

        SampleOutcome {
            fetch,
            arrived_now,
            update: self.to_update(location, recorded_at),
        }
    }

    fn plan_route_fetch(
        &mut self,
        location: GeoPoint,
        immediate_m: f64,
        at: DateTime<Utc>,
    ) -> Option<FetchPlan> {
        if self.fetch_in_flight || immediate_m <= ROUTE_FETCH_MIN_DISTANCE_M {
            return None;
        }

        let due = match &self.last_fetch {
            None => true,
            Some(mark) => {
                geo::haversine_m(&mark.location, &location) > ROUTE_FETCH_MOVE_M
                    || at - mark.at >= Duration::seconds(ROUTE_FETCH_INTERVAL_S)
            }
        };
        if !due {
            return None;
        }

        self.fetch_in_flight = true;
        self.last_fetch = Some(FetchMark { at, location });

        Some(FetchPlan {
            origin: location,
            destination: self.customer,
            immediate_m,
            requested_at: at,
        })
    }

    fn apply_route_result(
        &mut self,
        result: Result<RouteSummary, DirectionsError>,
        immediate_m: f64,
        at: DateTime<Utc>,
    ) -> (TrackingUpdate, &'static str) {
        self.fetch_in_flight = false;

        let outcome = match result {
            Ok(summary) if plausible(&summary, immediate_m) => {
                match polyline::decode(&summary.polyline) {
                    Ok(points) => {
                        self.distance_m = summary.distance_m;
                        self.duration_s = summary.duration_s;
                        self.eta = Some(at + seconds(summary.duration_s));
                        self.route = points;
                        "validated"
                    }
                    Err(err) => {
                        warn!(booking_id = %self.booking_id, error = %err, "undecodable route polyline");
                        self.straight_line(immediate_m, at);
                        "fallback"
                    }
                }
            }
            Ok(_) => {
                self.straight_line(immediate_m, at);
                "fallback"
            }
            Err(err) => {
                warn!(booking_id = %self.booking_id, error = %err, "directions lookup failed");
                self.straight_line(immediate_m, at);
                "fallback"
            }
        };

        let location = self.current.unwrap_or(self.customer);
        let recorded_at = self.last_sample_at.unwrap_or(at);
        (self.to_update(location, recorded_at), outcome)
    }

    fn straight_line(&mut self, immediate_m: f64, at: DateTime<Utc>) {
        self.distance_m = immediate_m;
        self.duration_s = immediate_m / 1000.0 / FALLBACK_SPEED_KMH * 3600.0;
        self.eta = Some(at + seconds(self.duration_s));
        self.route.clear();
    }

    fn arrival_notification(&self, sent_at: DateTime<Utc>) -> Notification {
        Notification {
            recipient: Recipient::Customer(self.customer_id),
            booking_id: self.booking_id,
            event: NotificationEvent::ProviderArrived,
            actor_name: self.provider_name.clone(),
            service_name: self.service_name.clone(),
            sent_at,
        }
    }

    fn to_update(&self, location: GeoPoint, recorded_at: DateTime<Utc>) -> TrackingUpdate {
        TrackingUpdate {
            booking_id: self.booking_id,
            provider_id: self.provider_id,
            location,
            distance_m: self.distance_m,
            duration_s: self.duration_s,
            eta: self.eta,
            has_arrived: self.has_arrived,
            route: self.route.clone(),
            recorded_at,
        }
    }

    fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            booking_id: self.booking_id,
            provider_id: self.provider_id,
            location: self.current,
            customer_location: self.customer,
            travel_path: self.travel_path.clone(),
            route: self.route.clone(),
            distance_m: self.distance_m,
            duration_s: self.duration_s,
            eta: self.eta,
            has_arrived: self.has_arrived,
            started_at: self.started_at,
        }
    }
}

fn plausible(summary: &RouteSummary, immediate_m: f64) -> bool {
    summary.distance_m > 0.0
        && summary.duration_s > 0.0
        && summary.distance_m >= 0.5 * immediate_m
        && summary.distance_m <= 2.0 * immediate_m
}

fn seconds(value: f64) -> Duration {
    Duration::milliseconds((value * 1000.0) as i64)
}
