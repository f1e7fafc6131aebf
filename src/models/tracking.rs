use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// One processed position update, fanned out to subscribed customers.
#[derive(Debug, Clone, Serialize)]
pub struct TrackingUpdate {
    pub booking_id: Uuid,
    pub provider_id: Uuid,
    pub location: GeoPoint,
    pub distance_m: f64,
    pub duration_s: f64,
    pub eta: Option<DateTime<Utc>>,
    pub has_arrived: bool,
    pub route: Vec<GeoPoint>,
    pub recorded_at: DateTime<Utc>,
}

/// Point-in-time view of a tracking session, served on request.
#[derive(Debug, Clone, Serialize)]
pub struct TrackingSnapshot {
    pub booking_id: Uuid,
    pub provider_id: Uuid,
    pub location: Option<GeoPoint>,
    pub customer_location: GeoPoint,
    pub travel_path: Vec<GeoPoint>,
    pub route: Vec<GeoPoint>,
    pub distance_m: f64,
    pub duration_s: f64,
    pub eta: Option<DateTime<Utc>>,
    pub has_arrived: bool,
    pub started_at: DateTime<Utc>,
}
