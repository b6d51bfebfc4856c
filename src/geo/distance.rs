//! Great-circle distance and GPS-derived metrics.

use crate::tracking::types::TrackingPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters (haversine).
///
/// Inputs are in degrees. The result is non-negative; an antipodal pair
/// returns approximately `PI * EARTH_RADIUS_M`.
pub fn haversine_m(a_lat: f64, a_lon: f64, b_lat: f64, b_lon: f64) -> f64 {
    let phi1 = a_lat.to_radians();
    let phi2 = b_lat.to_radians();
    let d_phi = (b_lat - a_lat).to_radians();
    let d_lambda = (b_lon - a_lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);

    // Clamp guards against rounding pushing sqrt's argument past 1.0.
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Map a GPS accuracy radius to a 0-5 signal-strength bucket.
///
/// Monotone non-increasing in accuracy: tighter accuracy means a higher
/// bucket. Missing accuracy reports 0 (no usable fix quality).
pub fn gps_strength_bucket(accuracy_m: Option<f64>) -> u8 {
    match accuracy_m {
        Some(a) if a <= 5.0 => 5,
        Some(a) if a <= 10.0 => 4,
        Some(a) if a <= 20.0 => 3,
        Some(a) if a <= 50.0 => 2,
        Some(a) if a <= 100.0 => 1,
        _ => 0,
    }
}

/// Speed in m/s derived from two consecutive points.
///
/// Display fallback for samples that arrive without a speed reading; the
/// derived value is never stored in the path. The time delta is clamped to
/// at least one millisecond so a jittered near-collision cannot explode.
pub fn derived_speed_mps(prev: &TrackingPoint, cur: &TrackingPoint) -> f64 {
    if let Some(speed) = cur.speed {
        return speed;
    }
    let dist = haversine_m(prev.latitude, prev.longitude, cur.latitude, cur.longitude);
    let dt_ms = (cur.timestamp - prev.timestamp).max(1.0);
    dist / dt_ms * 1000.0
}
