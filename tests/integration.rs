use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use serde_json::{json, Value};
use tower::ServiceExt;

use homeserve::api::rest::router;
use homeserve::directions::{DirectionsError, DirectionsProvider, RouteSummary};
use homeserve::engine::tracking::TrackerSettings;
use homeserve::models::tracking::GeoPoint;
use homeserve::notify::{Notification, NotificationEvent, Notifier, NotifyError};
use homeserve::state::AppState;

const CUSTOMER_LAT: f64 = 12.9716;
const CUSTOMER_LNG: f64 = 77.5946;
// Meters per degree of latitude under the haversine radius in use.
const M_PER_DEG_LAT: f64 = 111_195.0;

struct OfflineDirections;

#[async_trait]
impl DirectionsProvider for OfflineDirections {
    async fn route(
        &self,
        _origin: GeoPoint,
        _destination: GeoPoint,
    ) -> Result<RouteSummary, DirectionsError> {
        Err(DirectionsError::Transport("offline".to_string()))
    }
}

struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    fn events(&self) -> Vec<NotificationEvent> {
        self.sent.lock().unwrap().iter().map(|n| n.event).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

fn setup() -> (axum::Router, Arc<RecordingNotifier>) {
    let notifier = RecordingNotifier::new();
    let state = AppState::new(
        64,
        TrackerSettings::default(),
        Arc::new(OfflineDirections),
        notifier.clone(),
    );
    (router(Arc::new(state)), notifier)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn next_weekday(weekday: Weekday) -> NaiveDate {
    let today = Utc::now().date_naive();
    (1..=7)
        .map(|days| today + Duration::days(days))
        .find(|date| date.weekday() == weekday)
        .unwrap()
}

async fn register(app: &axum::Router, path: &str, name: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request("POST", path, json!({ "name": name })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["id"].as_str().unwrap().to_string()
}

fn booking_body(customer_id: &str, provider_id: &str, date: NaiveDate, slot: &str) -> Value {
    json!({
        "customer_id": customer_id,
        "provider_id": provider_id,
        "service_id": uuid::Uuid::new_v4(),
        "service_name": "Deep Cleaning",
        "scheduled_date": date,
        "scheduled_slot": slot,
        "address": {
            "street": "12 Residency Rd",
            "city": "Bengaluru",
            "state": "KA",
            "pincode": "560025",
            "landmark": null,
            "lat": CUSTOMER_LAT,
            "lng": CUSTOMER_LNG
        },
        "price": 1499.0
    })
}

async fn create_booking(app: &axum::Router, customer_id: &str, provider_id: &str) -> String {
    let date = next_weekday(Weekday::Mon);
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/bookings",
            booking_body(customer_id, provider_id, date, "10:00 AM - 11:00 AM"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["id"].as_str().unwrap().to_string()
}

async fn set_status(
    app: &axum::Router,
    booking_id: &str,
    status: &str,
    actor: &str,
    reason: Option<&str>,
) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/bookings/{booking_id}/status"),
            json!({ "status": status, "actor": actor, "reason": reason }),
        ))
        .await
        .unwrap()
}

async fn post_sample(app: &axum::Router, booking_id: &str, meters_north: f64, offset_s: i64) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/tracking/{booking_id}/location"),
            json!({
                "lat": CUSTOMER_LAT + meters_north / M_PER_DEG_LAT,
                "lng": CUSTOMER_LNG,
                "recorded_at": Utc::now() + Duration::seconds(offset_s)
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _notifier) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["customers"], 0);
    assert_eq!(body["providers"], 0);
    assert_eq!(body["bookings"], 0);
    assert_eq!(body["tracking_sessions"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _notifier) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("active_tracking_sessions"));
}

#[tokio::test]
async fn register_party_empty_name_returns_400() {
    let (app, _notifier) = setup();

    for path in ["/customers", "/providers"] {
        let response = app
            .clone()
            .oneshot(json_request("POST", path, json!({ "name": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn availability_document_defaults_on_first_read() {
    let (app, _notifier) = setup();
    let provider_id = register(&app, "/providers", "Ravi").await;

    let response = app
        .oneshot(get_request(&format!("/providers/{provider_id}/availability")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["advance_booking_days"], 30);
    assert_eq!(body["is_accepting_bookings"], true);
    assert_eq!(body["weekly_schedule"]["monday"]["is_available"], true);
    assert_eq!(
        body["weekly_schedule"]["monday"]["slots"]
            .as_array()
            .unwrap()
            .len(),
        9
    );
    assert_eq!(body["weekly_schedule"]["sunday"]["is_available"], false);
}

#[tokio::test]
async fn put_availability_rejects_unknown_slot_labels() {
    let (app, _notifier) = setup();
    let provider_id = register(&app, "/providers", "Ravi").await;

    let mut schedule = json!({});
    for day in [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ] {
        schedule[day] = json!({ "is_available": false, "slots": [] });
    }
    schedule["monday"] = json!({
        "is_available": true,
        "slots": ["10:30 AM - 11:30 AM"]
    });

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/providers/{provider_id}/availability"),
            json!({ "weekly_schedule": schedule }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn put_availability_normalizes_slot_order() {
    let (app, _notifier) = setup();
    let provider_id = register(&app, "/providers", "Ravi").await;

    let mut schedule = json!({});
    for day in [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ] {
        schedule[day] = json!({ "is_available": false, "slots": [] });
    }
    schedule["monday"] = json!({
        "is_available": true,
        "slots": ["05:00 PM - 06:00 PM", "09:00 AM - 10:00 AM", "09:00 AM - 10:00 AM"]
    });

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/providers/{provider_id}/availability"),
            json!({ "weekly_schedule": schedule, "advance_booking_days": 14 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(
        body["weekly_schedule"]["monday"]["slots"],
        json!(["09:00 AM - 10:00 AM", "05:00 PM - 06:00 PM"])
    );
    assert_eq!(body["advance_booking_days"], 14);
}

#[tokio::test]
async fn unregistered_provider_gets_default_slots_next_monday() {
    let (app, _notifier) = setup();
    let date = next_weekday(Weekday::Mon);

    let response = app
        .oneshot(get_request(&format!(
            "/providers/{}/slots?date={date}",
            uuid::Uuid::new_v4()
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["is_available"], true);
    assert_eq!(body["reason"], "default schedule");

    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 9);
    assert_eq!(slots[0], "09:00 AM - 10:00 AM");
    assert_eq!(slots[8], "05:00 PM - 06:00 PM");
}

#[tokio::test]
async fn past_date_slot_query_is_unavailable() {
    let (app, _notifier) = setup();
    let yesterday = Utc::now().date_naive() - Duration::days(1);

    let response = app
        .oneshot(get_request(&format!(
            "/providers/{}/slots?date={yesterday}",
            uuid::Uuid::new_v4()
        )))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["is_available"], false);
    assert_eq!(body["reason"], "past date");
    assert_eq!(body["slots"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn booked_slot_disappears_from_availability() {
    let (app, _notifier) = setup();
    let customer_id = register(&app, "/customers", "Asha").await;
    let provider_id = register(&app, "/providers", "Ravi").await;
    let date = next_weekday(Weekday::Mon);

    let booking_id = create_booking(&app, &customer_id, &provider_id).await;
    let response = set_status(&app, &booking_id, "accepted", "provider", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request(&format!(
            "/providers/{provider_id}/slots?date={date}"
        )))
        .await
        .unwrap();
    let body = body_json(response).await;

    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 8);
    assert!(!slots.iter().any(|slot| slot == "10:00 AM - 11:00 AM"));
}

#[tokio::test]
async fn double_booking_the_same_slot_conflicts() {
    let (app, _notifier) = setup();
    let customer_id = register(&app, "/customers", "Asha").await;
    let provider_id = register(&app, "/providers", "Ravi").await;
    let date = next_weekday(Weekday::Mon);

    create_booking(&app, &customer_id, &provider_id).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/bookings",
            booking_body(&customer_id, &provider_id, date, "10:00 AM - 11:00 AM"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn booking_with_unknown_slot_label_is_rejected() {
    let (app, _notifier) = setup();
    let customer_id = register(&app, "/customers", "Asha").await;
    let provider_id = register(&app, "/providers", "Ravi").await;
    let date = next_weekday(Weekday::Mon);

    let response = app
        .oneshot(json_request(
            "POST",
            "/bookings",
            booking_body(&customer_id, &provider_id, date, "10:00AM - 11:00AM"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn booking_creation_notifies_the_provider() {
    let (app, notifier) = setup();
    let customer_id = register(&app, "/customers", "Asha").await;
    let provider_id = register(&app, "/providers", "Ravi").await;

    create_booking(&app, &customer_id, &provider_id).await;

    assert_eq!(notifier.events(), vec![NotificationEvent::BookingRequested]);
}

#[tokio::test]
async fn rejecting_requires_a_reason() {
    let (app, _notifier) = setup();
    let customer_id = register(&app, "/customers", "Asha").await;
    let provider_id = register(&app, "/providers", "Ravi").await;
    let booking_id = create_booking(&app, &customer_id, &provider_id).await;

    let response = set_status(&app, &booking_id, "rejected", "provider", Some("")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = set_status(&app, &booking_id, "rejected", "provider", Some("unavailable")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["cancellation_reason"], "unavailable");
}

#[tokio::test]
async fn illegal_transition_returns_conflict() {
    let (app, _notifier) = setup();
    let customer_id = register(&app, "/customers", "Asha").await;
    let provider_id = register(&app, "/providers", "Ravi").await;
    let booking_id = create_booking(&app, &customer_id, &provider_id).await;

    let response = set_status(&app, &booking_id, "in-progress", "provider", None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(get_request(&format!("/bookings/{booking_id}")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn unknown_booking_transition_returns_404() {
    let (app, _notifier) = setup();
    let response = set_status(
        &app,
        "00000000-0000-0000-0000-000000000000",
        "accepted",
        "provider",
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn booking_counts_are_per_status() {
    let (app, _notifier) = setup();
    let customer_id = register(&app, "/customers", "Asha").await;
    let provider_id = register(&app, "/providers", "Ravi").await;

    let first = create_booking(&app, &customer_id, &provider_id).await;
    let date = next_weekday(Weekday::Tue);
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/bookings",
            booking_body(&customer_id, &provider_id, date, "11:00 AM - 12:00 PM"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = set_status(&app, &first, "accepted", "provider", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request(&format!(
            "/bookings/counts?provider_id={provider_id}"
        )))
        .await
        .unwrap();
    let body = body_json(response).await;

    assert_eq!(body["pending"], 1);
    assert_eq!(body["accepted"], 1);
    assert_eq!(body["completed"], 0);
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn counts_require_exactly_one_party() {
    let (app, _notifier) = setup();

    let response = app
        .clone()
        .oneshot(get_request("/bookings/counts"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tracking_requires_an_underway_booking() {
    let (app, _notifier) = setup();
    let customer_id = register(&app, "/customers", "Asha").await;
    let provider_id = register(&app, "/providers", "Ravi").await;
    let booking_id = create_booking(&app, &customer_id, &provider_id).await;

    let response = app
        .oneshot(post_request(&format!("/tracking/{booking_id}/start")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn tracking_flow_detects_arrival_and_stays_arrived() {
    let (app, notifier) = setup();
    let customer_id = register(&app, "/customers", "Asha").await;
    let provider_id = register(&app, "/providers", "Ravi").await;
    let booking_id = create_booking(&app, &customer_id, &provider_id).await;

    set_status(&app, &booking_id, "accepted", "provider", None).await;
    set_status(&app, &booking_id, "on-the-way", "provider", None).await;

    let response = app
        .clone()
        .oneshot(post_request(&format!("/tracking/{booking_id}/start")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // A second session for the same booking is refused.
    let response = app
        .clone()
        .oneshot(post_request(&format!("/tracking/{booking_id}/start")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    post_sample(&app, &booking_id, 80.0, 0).await;
    post_sample(&app, &booking_id, 55.0, 10).await;

    let response = app
        .clone()
        .oneshot(get_request(&format!("/tracking/{booking_id}")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["has_arrived"], false);
    assert!(body["distance_m"].as_f64().unwrap() > 50.0);

    post_sample(&app, &booking_id, 45.0, 20).await;
    post_sample(&app, &booking_id, 60.0, 30).await;

    let response = app
        .clone()
        .oneshot(get_request(&format!("/tracking/{booking_id}")))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["has_arrived"], true);
    assert_eq!(body["travel_path"].as_array().unwrap().len(), 4);

    assert!(notifier
        .events()
        .contains(&NotificationEvent::ProviderArrived));

    let response = app
        .clone()
        .oneshot(post_request(&format!("/tracking/{booking_id}/stop")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(get_request(&format!("/tracking/{booking_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn completing_a_booking_ends_tracking_and_bumps_the_counter() {
    let (app, _notifier) = setup();
    let customer_id = register(&app, "/customers", "Asha").await;
    let provider_id = register(&app, "/providers", "Ravi").await;
    let booking_id = create_booking(&app, &customer_id, &provider_id).await;

    set_status(&app, &booking_id, "accepted", "provider", None).await;
    set_status(&app, &booking_id, "on-the-way", "provider", None).await;
    set_status(&app, &booking_id, "in-progress", "provider", None).await;

    let response = app
        .clone()
        .oneshot(post_request(&format!("/tracking/{booking_id}/start")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = set_status(&app, &booking_id, "completed", "provider", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "completed");
    assert!(!body["completed_at"].is_null());

    let response = app
        .clone()
        .oneshot(get_request(&format!("/tracking/{booking_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get_request("/providers")).await.unwrap();
    let providers = body_json(response).await;
    assert_eq!(providers.as_array().unwrap()[0]["completed_jobs"], 1);
}

#[tokio::test]
async fn cancelling_an_underway_booking_is_refused() {
    let (app, _notifier) = setup();
    let customer_id = register(&app, "/customers", "Asha").await;
    let provider_id = register(&app, "/providers", "Ravi").await;
    let booking_id = create_booking(&app, &customer_id, &provider_id).await;

    set_status(&app, &booking_id, "accepted", "provider", None).await;
    set_status(&app, &booking_id, "on-the-way", "provider", None).await;

    let response = set_status(
        &app,
        &booking_id,
        "cancelled",
        "customer",
        Some("changed my mind"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}
