// src/filter/geo.rs
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Plaza de España, Madrid.
    pub const PLAZA_DE_ESPANA: GeoPoint = GeoPoint::new(40.4233, -3.7122);

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self, other)
    }
}

/// Great-circle distance on a spherical Earth.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let (lat1, lat2) = (a.latitude.to_radians(), b.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_to_self() {
        let p = GeoPoint::PLAZA_DE_ESPANA;
        assert!(p.distance_km(&p).abs() < 1e-9);
    }

    #[test]
    fn known_distance_madrid_barcelona() {
        let madrid = GeoPoint::new(40.4168, -3.7038);
        let barcelona = GeoPoint::new(41.3874, 2.1686);
        let d = haversine_km(&madrid, &barcelona);
        assert!((d - 505.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn templo_de_debod_is_under_a_kilometre() {
        let debod = GeoPoint::new(40.4240, -3.7177);
        let d = GeoPoint::PLAZA_DE_ESPANA.distance_km(&debod);
        assert!(d > 0.3 && d < 0.6, "got {d}");
    }
}
