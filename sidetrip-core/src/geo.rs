//! Geo math: great-circle distance, mode speeds, search-radius and
//! ideal-one-way estimators. All pure and deterministic.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (sphere model).
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS-84 coordinate, longitude first (provider wire order).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Coordinates sane enough to send to a provider.
    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

/// Travel mode with a fixed meters-per-minute assumption, used everywhere
/// real routing is not yet known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Walk,
    Bike,
    Drive,
}

impl TravelMode {
    pub fn meters_per_minute(self) -> f64 {
        match self {
            TravelMode::Walk => 85.0,
            TravelMode::Bike => 250.0,
            TravelMode::Drive => 550.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Walk => "walk",
            TravelMode::Bike => "bike",
            TravelMode::Drive => "drive",
        }
    }
}

/// Great-circle distance in meters (haversine, spherical Earth).
pub fn haversine_distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Search radius for the nearby-place query.
///
/// Target one-way travel time is 25% of the available minutes, clamped to
/// [8, 60] minutes, converted via mode speed, with the final radius clamped
/// to [800, 12000] meters so provider queries stay bounded for degenerate
/// windows.
pub fn suggested_search_radius_meters(mode: TravelMode, available_minutes: i64) -> f64 {
    let one_way_min = (available_minutes as f64 * 0.25).clamp(8.0, 60.0);
    (one_way_min * mode.meters_per_minute()).clamp(800.0, 12_000.0)
}

/// Ranking target for one-way travel time: 20% of the available minutes,
/// clamped to [10, 30]. Intentionally a smaller fraction than the search
/// radius so the search stays slightly more generous than the ranking ideal.
pub fn ideal_one_way_minutes(available_minutes: i64) -> f64 {
    (available_minutes as f64 * 0.20).clamp(10.0, 30.0)
}
