//! Geodesy helpers for track processing.

pub mod distance;

pub use distance::{derived_speed_mps, gps_strength_bucket, haversine_m, EARTH_RADIUS_M};
