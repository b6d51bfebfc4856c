//! Ordered, deduplicated sample buffer with threshold-based admission.

use crate::geo::haversine_m;
use crate::tracking::types::TrackingPoint;

/// Admission thresholds selected at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionMode {
    /// 500 ms / 2 m thresholds
    #[default]
    Normal,
    /// 250 ms / 0.5 m thresholds; costs battery
    HighPrecision,
}

impl AdmissionMode {
    /// Minimum time between admitted samples, milliseconds.
    pub fn min_interval_ms(self) -> f64 {
        match self {
            AdmissionMode::Normal => 500.0,
            AdmissionMode::HighPrecision => 250.0,
        }
    }

    /// Minimum movement between admitted samples, meters.
    pub fn min_distance_m(self) -> f64 {
        match self {
            AdmissionMode::Normal => 2.0,
            AdmissionMode::HighPrecision => 0.5,
        }
    }
}

/// Outcome of offering a sample to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Appended to the path
    Admitted,
    /// Valid but below both thresholds; refreshes liveness only
    Rejected,
    /// Failed the data-model invariants; dropped and counted
    Invalid,
}

/// Bounded-by-policy ordered sequence of tracking points.
///
/// The active session path is unbounded by design; the admission predicate
/// is the only thing limiting growth. The predicate is pure and never
/// suspends.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    mode: AdmissionMode,
    points: Vec<TrackingPoint>,
    /// Timestamp of the most recent offer, admitted or not
    last_seen_ms: Option<f64>,
    admitted: u64,
    rejected: u64,
    invalid: u64,
}

impl SampleBuffer {
    pub fn new(mode: AdmissionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Offer a sample.
    ///
    /// Admits when the buffer is empty, or when the sample clears either
    /// the time or the distance threshold against the current tail.
    /// Invalid samples are dropped silently; the counter is the only
    /// diagnostic.
    pub fn append(&mut self, p: TrackingPoint) -> Admission {
        if !p.is_valid() {
            self.invalid += 1;
            return Admission::Invalid;
        }

        self.last_seen_ms = Some(p.timestamp);

        let admit = match self.points.last() {
            None => true,
            Some(last) => {
                let dt = p.timestamp - last.timestamp;
                let dd = haversine_m(last.latitude, last.longitude, p.latitude, p.longitude);
                dt >= self.mode.min_interval_ms() || dd >= self.mode.min_distance_m()
            }
        };

        if admit {
            self.points.push(p);
            self.admitted += 1;
            Admission::Admitted
        } else {
            self.rejected += 1;
            Admission::Rejected
        }
    }

    /// Whether a sample with this exact timestamp is already in the path.
    pub fn contains_timestamp(&self, timestamp: f64) -> bool {
        self.points.iter().any(|p| p.timestamp == timestamp)
    }

    /// Current contents in insertion order.
    pub fn snapshot(&self) -> Vec<TrackingPoint> {
        self.points.clone()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&TrackingPoint> {
        self.points.last()
    }

    /// Timestamp of the most recent valid offer, admitted or rejected.
    pub fn last_seen_ms(&self) -> Option<f64> {
        self.last_seen_ms
    }

    pub fn admitted_count(&self) -> u64 {
        self.admitted
    }

    pub fn invalid_count(&self) -> u64 {
        self.invalid
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.last_seen_ms = None;
        self.admitted = 0;
        self.rejected = 0;
        self.invalid = 0;
    }

    /// Consume the buffer, returning the path.
    pub fn into_points(self) -> Vec<TrackingPoint> {
        self.points
    }

    /// Replace the path by replaying a timestamp-sorted candidate sequence
    /// through the admission predicate. Counters keep accumulating; the
    /// liveness stamp is untouched.
    pub fn rebuild_from(&mut self, candidates: Vec<TrackingPoint>) {
        self.points.clear();
        let last_seen = self.last_seen_ms;
        for p in candidates {
            self.append(p);
        }
        self.last_seen_ms = last_seen;
    }
}
