use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub sample_queue_size: usize,
    pub geofence_radius_m: f64,
    pub directions_base_url: String,
    pub directions_api_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            sample_queue_size: parse_or_default("SAMPLE_QUEUE_SIZE", 256)?,
            geofence_radius_m: parse_or_default("GEOFENCE_RADIUS_M", 50.0)?,
            directions_base_url: env::var("DIRECTIONS_BASE_URL")
                .unwrap_or_else(|_| "https://maps.googleapis.com/maps/api".to_string()),
            directions_api_key: env::var("DIRECTIONS_API_KEY").unwrap_or_default(),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
