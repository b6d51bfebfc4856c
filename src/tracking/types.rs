//! Tracking types for session capture and persistence.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::location::types::PermissionKind;
use crate::tracking::buffer::AdmissionMode;

/// A single geo-sample.
///
/// The timestamp is epoch milliseconds. It is an `f64` because background
/// samples carry a sub-millisecond jitter in the fractional part to keep
/// stamps produced in the same batch distinct; timestamp equality means
/// "same logical sample" everywhere in the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingPoint {
    /// Latitude in degrees, [-90, 90]
    pub latitude: f64,
    /// Longitude in degrees, (-180, 180]
    pub longitude: f64,
    /// Epoch milliseconds, strictly positive
    pub timestamp: f64,
    /// Horizontal accuracy radius in meters, positive when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Reported ground speed in m/s, non-negative when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl TrackingPoint {
    /// Whether the sample satisfies the data-model invariants.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude)
            && self.longitude > -180.0
            && self.longitude <= 180.0
            && self.timestamp > 0.0
            && self.accuracy.map_or(true, |a| a > 0.0)
            && self.speed.map_or(true, |s| s >= 0.0)
    }
}

/// Kind of media attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

/// A photo or video captured during a session.
///
/// The uri is opaque to the tracker; the media collaborator owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    /// Unique within the session
    pub id: Uuid,
    /// Opaque media locator
    pub uri: String,
    /// Photo or video
    pub kind: MediaKind,
    /// Capture time, epoch milliseconds
    pub timestamp: i64,
    /// Capture location, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<TrackingPoint>,
}

/// One start-to-stop training record.
///
/// While a session is active the five derived fields (`end_time`,
/// `duration_seconds`, `distance_meters`, `average_speed`, `max_speed`)
/// are absent; on completion all five are present and consistent with
/// `path`. The path is strictly non-decreasing in timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique identifier
    pub id: Uuid,
    /// Rider account id (opaque)
    pub user_id: String,
    /// Horse id (opaque)
    pub horse_id: String,
    /// Horse display name, carried for notifications and history
    pub horse_name: String,
    /// Training-type id (opaque)
    pub training_type: String,
    /// Session start, epoch milliseconds
    pub start_time: i64,
    /// Session end, epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    /// Wall-clock duration, whole seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    /// Polyline length of the path in meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    /// Recorded track, ordered by timestamp
    pub path: Vec<TrackingPoint>,
    /// Mean of the positive speed samples in m/s, 0 if none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_speed: Option<f64>,
    /// Maximum positive speed sample in m/s, 0 if none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f64>,
    /// Media captured during the session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<MediaItem>>,
}

impl Session {
    /// Create a new active session starting now.
    pub fn new(params: &StartParams, start_time: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: params.user_id.clone(),
            horse_id: params.horse_id.clone(),
            horse_name: params.horse_name.clone(),
            training_type: params.training_type.clone(),
            start_time,
            end_time: None,
            duration_seconds: None,
            distance_meters: None,
            path: Vec::new(),
            average_speed: None,
            max_speed: None,
            media: None,
        }
    }

    /// Whether the session carries its completion statistics.
    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
            && self.duration_seconds.is_some()
            && self.distance_meters.is_some()
            && self.average_speed.is_some()
            && self.max_speed.is_some()
    }
}

/// Lifecycle state of the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No session in progress
    #[default]
    Idle,
    /// Start requested, permissions and producers being brought up
    Arming,
    /// Recording
    Active,
    /// Stop in progress, statistics being computed
    Finalizing,
}

/// Parameters bound at session start.
#[derive(Debug, Clone)]
pub struct StartParams {
    pub user_id: String,
    pub horse_id: String,
    pub horse_name: String,
    pub training_type: String,
    /// Tighter admission thresholds and shorter producer intervals
    pub high_precision: bool,
}

/// Tick intervals and admission mode derived from the start parameters.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub mode: AdmissionMode,
    pub merge_tick_ms: u64,
    pub notification_tick_ms: u64,
}

impl TrackerConfig {
    pub fn for_mode(high_precision: bool) -> Self {
        if high_precision {
            Self {
                mode: AdmissionMode::HighPrecision,
                merge_tick_ms: 500,
                notification_tick_ms: 1000,
            }
        } else {
            Self {
                mode: AdmissionMode::Normal,
                merge_tick_ms: 1000,
                notification_tick_ms: 1000,
            }
        }
    }
}

/// Point-in-time view of the tracker for observers.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// Seconds since start, 0 while idle
    pub elapsed_seconds: u64,
    /// Points admitted to the path so far
    pub path_len: usize,
    /// Polyline distance covered so far, meters
    pub distance_meters: f64,
    /// Speed over the path tail in m/s: the newest sample's reported
    /// speed, or the haversine-derived fallback when it carries none
    pub current_speed_mps: f64,
    /// Strength bucket of the most recent fix, 0-5
    pub gps_strength: u8,
    /// Background producer observed dead; session continues on foreground
    pub degraded: bool,
}

/// Errors from the session tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A required location permission was refused
    #[error("{0} location permission denied")]
    PermissionDenied(PermissionKind),

    /// A producer failed to start after one retry
    #[error("location producer unavailable: {0}")]
    ProducerUnavailable(String),

    /// Start requested while a session is already in progress
    #[error("a session is already in progress")]
    AlreadyActive,

    /// Start guard failed: no horse bound
    #[error("no horse selected")]
    HorseNotBound,

    /// Start guard failed: no training type bound
    #[error("no training type selected")]
    TrainingNotBound,

    /// Start guard failed: no current location fix
    #[error("current location unknown")]
    LocationUnknown,

    /// Operation requires an active session
    #[error("no active session")]
    NotActive,

    /// The clock went backwards between start and stop
    #[error("clock anomaly: end {end_ms} precedes start {start_ms}")]
    ClockAnomaly { start_ms: i64, end_ms: i64 },

    /// Scratch read or write failed
    #[error("scratch I/O failed: {0}")]
    ScratchIo(String),

    /// The session could not be appended to the store
    #[error("failed to store session: {0}")]
    StoreFailed(String),
}
