//! External directions lookup. Only the first route's first leg and the
//! overview polyline are consumed; everything else in the payload is
//! ignored. Lookup failures are never surfaced to users -- the tracking
//! engine falls back to straight-line estimates.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::models::tracking::GeoPoint;

#[derive(Debug, Clone)]
pub struct RouteSummary {
    pub distance_m: f64,
    pub duration_s: f64,
    pub polyline: String,
}

#[derive(Debug, Error)]
pub enum DirectionsError {
    #[error("directions request failed: {0}")]
    Transport(String),

    #[error("directions provider returned status {0}")]
    Status(String),

    #[error("malformed directions response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    async fn route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteSummary, DirectionsError>;
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct Route {
    #[serde(default)]
    legs: Vec<Leg>,
    overview_polyline: OverviewPolyline,
}

#[derive(Debug, Deserialize)]
struct Leg {
    distance: Measure,
    duration: Measure,
}

#[derive(Debug, Deserialize)]
struct Measure {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct OverviewPolyline {
    points: String,
}

impl DirectionsResponse {
    fn into_summary(self) -> Result<RouteSummary, DirectionsError> {
        if self.status != "OK" {
            return Err(DirectionsError::Status(self.status));
        }

        let route = self
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| DirectionsError::Malformed("no routes".to_string()))?;
        let polyline = route.overview_polyline.points;
        let leg = route
            .legs
            .into_iter()
            .next()
            .ok_or_else(|| DirectionsError::Malformed("route has no legs".to_string()))?;

        Ok(RouteSummary {
            distance_m: leg.distance.value,
            duration_s: leg.duration.value,
            polyline,
        })
    }
}

pub struct HttpDirections {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpDirections {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl DirectionsProvider for HttpDirections {
    async fn route(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<RouteSummary, DirectionsError> {
        let url = format!("{}/directions/json", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("origin", format!("{},{}", origin.lat, origin.lng)),
                (
                    "destination",
                    format!("{},{}", destination.lat, destination.lng),
                ),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|err| DirectionsError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(DirectionsError::Status(response.status().to_string()));
        }

        let payload: DirectionsResponse = response
            .json()
            .await
            .map_err(|err| DirectionsError::Malformed(err.to_string()))?;

        payload.into_summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<RouteSummary, DirectionsError> {
        let response: DirectionsResponse = serde_json::from_value(value).unwrap();
        response.into_summary()
    }

    #[test]
    fn consumes_first_leg_and_overview_polyline() {
        let summary = parse(json!({
            "status": "OK",
            "routes": [{
                "legs": [
                    { "distance": { "value": 4200.0, "text": "4.2 km" },
                      "duration": { "value": 780.0, "text": "13 mins" } },
                    { "distance": { "value": 9999.0 }, "duration": { "value": 9999.0 } }
                ],
                "overview_polyline": { "points": "_p~iF~ps|U" },
                "summary": "NH 44"
            }]
        }))
        .unwrap();

        assert_eq!(summary.distance_m, 4200.0);
        assert_eq!(summary.duration_s, 780.0);
        assert_eq!(summary.polyline, "_p~iF~ps|U");
    }

    #[test]
    fn non_ok_status_is_an_error() {
        let err = parse(json!({ "status": "ZERO_RESULTS", "routes": [] })).unwrap_err();
        assert!(matches!(err, DirectionsError::Status(s) if s == "ZERO_RESULTS"));
    }

    #[test]
    fn empty_routes_is_malformed() {
        let err = parse(json!({ "status": "OK", "routes": [] })).unwrap_err();
        assert!(matches!(err, DirectionsError::Malformed(_)));
    }
}
