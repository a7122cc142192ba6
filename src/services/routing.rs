use crate::models::{Coordinate, RouteEstimate};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Minutes of travel per kilometre in the ETA heuristic.
pub const MINUTES_PER_KM: f64 = 1.5;

/// Fixed loading/handling overhead added to every trip, in minutes.
pub const FIXED_OVERHEAD_MINUTES: f64 = 15.0;

/// Straight-line route estimate between two points.
///
/// The ETA is a linear heuristic over the great-circle distance, not a
/// road-network route.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteEstimator;

impl RouteEstimator {
    pub fn estimate(a: Coordinate, b: Coordinate) -> RouteEstimate {
        let distance_km = haversine_km(a, b);
        let eta = (distance_km * MINUTES_PER_KM + FIXED_OVERHEAD_MINUTES).round();
        RouteEstimate {
            distance_km,
            eta_minutes: eta as u32,
        }
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}
