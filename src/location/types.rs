//! Location producer configuration and errors.

use thiserror::Error;

/// Which half of the location capability a permission covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionKind {
    /// While-in-use watcher
    Foreground,
    /// Long-running background task
    Background,
}

impl std::fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionKind::Foreground => write!(f, "foreground"),
            PermissionKind::Background => write!(f, "background"),
        }
    }
}

/// Platform accuracy mode requested from the positioning hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyClass {
    /// Best fix the hardware can produce; highest battery cost
    NavigationBest,
    High,
    Balanced,
}

/// Emission tuning for one producer subscription.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationConfig {
    pub accuracy_class: AccuracyClass,
    /// Minimum interval between emissions, milliseconds
    pub min_time_ms: u64,
    /// Minimum movement between emissions, meters
    pub min_distance_m: f64,
    /// Coalescing hint for the background task, milliseconds
    pub deferred_updates_ms: u64,
    pub show_foreground_service_badge: bool,
}

impl LocationConfig {
    /// Foreground watcher config for an active ride.
    pub fn ride_foreground(high_precision: bool) -> Self {
        Self {
            accuracy_class: AccuracyClass::NavigationBest,
            min_time_ms: if high_precision { 250 } else { 1000 },
            min_distance_m: if high_precision { 0.5 } else { 1.0 },
            deferred_updates_ms: if high_precision { 250 } else { 1000 },
            show_foreground_service_badge: true,
        }
    }

    /// Background long-task config for an active ride.
    pub fn ride_background(high_precision: bool) -> Self {
        Self {
            show_foreground_service_badge: false,
            ..Self::ride_foreground(high_precision)
        }
    }

    /// Relaxed watch kept alive between sessions so the map screen and the
    /// start guard always have a recent fix.
    pub fn idle_monitor() -> Self {
        Self {
            accuracy_class: AccuracyClass::Balanced,
            min_time_ms: 5000,
            min_distance_m: 10.0,
            deferred_updates_ms: 5000,
            show_foreground_service_badge: false,
        }
    }
}

/// Errors from the location producer driver.
#[derive(Debug, Error)]
pub enum LocationError {
    /// The platform reports the background task is already live; the
    /// caller must stop it first
    #[error("background task already running")]
    AlreadyRunning,

    /// The platform could not start the requested subscription
    #[error("location producer unavailable: {0}")]
    Unavailable(String),
}
