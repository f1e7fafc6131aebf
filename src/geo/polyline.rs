//! Encoded-polyline codec (1e-5 precision, signed varint deltas).
//!
//! Directions providers return route geometry as an encoded string; the
//! decoder must reproduce the exact point sequence in order.

use thiserror::Error;

use crate::models::tracking::GeoPoint;

const PRECISION: f64 = 1e5;

#[derive(Debug, Error)]
pub enum PolylineError {
    #[error("truncated polyline chunk")]
    Truncated,

    #[error("invalid polyline byte {0:#x}")]
    InvalidByte(u8),
}

pub fn decode(encoded: &str) -> Result<Vec<GeoPoint>, PolylineError> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let mut idx = 0;
    let mut lat = 0i64;
    let mut lng = 0i64;

    while idx < bytes.len() {
        let (delta_lat, next) = decode_value(bytes, idx)?;
        let (delta_lng, next) = decode_value(bytes, next)?;
        lat += delta_lat;
        lng += delta_lng;
        idx = next;

        points.push(GeoPoint {
            lat: lat as f64 / PRECISION,
            lng: lng as f64 / PRECISION,
        });
    }

    Ok(points)
}

pub fn encode(points: &[GeoPoint]) -> String {
    let mut out = String::new();
    let mut prev_lat = 0i64;
    let mut prev_lng = 0i64;

    for point in points {
        let lat = (point.lat * PRECISION).round() as i64;
        let lng = (point.lng * PRECISION).round() as i64;
        encode_value(lat - prev_lat, &mut out);
        encode_value(lng - prev_lng, &mut out);
        prev_lat = lat;
        prev_lng = lng;
    }

    out
}

fn decode_value(bytes: &[u8], mut idx: usize) -> Result<(i64, usize), PolylineError> {
    let mut shift = 0u32;
    let mut accum = 0i64;

    loop {
        let byte = *bytes.get(idx).ok_or(PolylineError::Truncated)?;
        if !(63..=126).contains(&byte) {
            return Err(PolylineError::InvalidByte(byte));
        }

        let chunk = (byte - 63) as i64;
        accum |= (chunk & 0x1f) << shift;
        idx += 1;
        shift += 5;

        if chunk & 0x20 == 0 {
            break;
        }
    }

    let value = if accum & 1 == 1 {
        !(accum >> 1)
    } else {
        accum >> 1
    };

    Ok((value, idx))
}

fn encode_value(value: i64, out: &mut String) {
    let mut v = if value < 0 { !(value << 1) } else { value << 1 };

    while v >= 0x20 {
        out.push((((v & 0x1f) | 0x20) as u8 + 63) as char);
        v >>= 5;
    }
    out.push((v as u8 + 63) as char);
}
