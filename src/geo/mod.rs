pub mod polyline;

use crate::models::tracking::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_M * central_angle
}

pub fn within_radius(a: &GeoPoint, b: &GeoPoint, radius_m: f64) -> bool {
    haversine_m(a, b) <= radius_m
}

#[cfg(test)]
mod tests {
    use super::{haversine_m, within_radius};
    use crate::models::tracking::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 53.5511,
            lng: 9.9937,
        };
        let distance = haversine_m(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_m(&london, &paris);
        assert!((distance - 343_000.0).abs() < 5_000.0);
    }

    #[test]
    fn radius_check_includes_boundary_and_excludes_beyond() {
        let center = GeoPoint {
            lat: 12.9716,
            lng: 77.5946,
        };
        // ~44m north of center
        let near = GeoPoint {
            lat: 12.9720,
            lng: 77.5946,
        };
        // ~550m north of center
        let far = GeoPoint {
            lat: 12.9766,
            lng: 77.5946,
        };

        assert!(within_radius(&center, &center, 0.0));
        assert!(within_radius(&near, &center, 50.0));
        assert!(!within_radius(&far, &center, 50.0));
    }
}
