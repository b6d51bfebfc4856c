//! Session lifecycle state machine.
//!
//! The manager is a synchronous state machine; every transition happens on
//! the caller's thread. The runtime driver layers periodic ticks and a
//! snapshot stream on top, and tests drive the same entry points directly
//! with a manual clock.

use std::sync::Arc;

use crossbeam::channel::Receiver;

use crate::geo::{derived_speed_mps, gps_strength_bucket, haversine_m};
use crate::location::producer::LocationProducer;
use crate::location::types::{LocationConfig, LocationError, PermissionKind};
use crate::platform::{Clock, Notifier, PermissionDecision, PermissionGate, PermissionStatus};
use crate::storage::scratch::{self, Scratch};
use crate::storage::store::SessionStore;
use crate::tracking::buffer::SampleBuffer;
use crate::tracking::merger::SampleMerger;
use crate::tracking::ticker::{NotificationTicker, StatusPayload};
use crate::tracking::types::{
    MediaItem, Session, SessionSnapshot, SessionStatus, StartParams, TrackerConfig, TrackerError,
    TrackingPoint,
};

/// Composes the producer driver, merger, buffer, store, and tickers into
/// one session lifecycle: Idle → Arming → Active → Finalizing → Idle.
pub struct SessionManager {
    producer: Box<dyn LocationProducer>,
    gate: Box<dyn PermissionGate>,
    notifier: Box<dyn Notifier>,
    clock: Arc<dyn Clock>,
    scratch: Arc<dyn Scratch>,
    store: Arc<SessionStore>,

    status: SessionStatus,
    config: TrackerConfig,
    buffer: SampleBuffer,
    merger: SampleMerger,
    ticker: NotificationTicker,
    session: Option<Session>,
    media: Vec<MediaItem>,

    foreground_rx: Option<Receiver<TrackingPoint>>,
    last_fix: Option<TrackingPoint>,
    gps_strength: u8,
    degraded: bool,
}

impl SessionManager {
    pub fn new(
        producer: Box<dyn LocationProducer>,
        gate: Box<dyn PermissionGate>,
        notifier: Box<dyn Notifier>,
        clock: Arc<dyn Clock>,
        scratch: Arc<dyn Scratch>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            producer,
            gate,
            notifier,
            clock,
            scratch,
            store,
            status: SessionStatus::Idle,
            config: TrackerConfig::for_mode(false),
            buffer: SampleBuffer::default(),
            merger: SampleMerger::new(),
            ticker: NotificationTicker::new(),
            session: None,
            media: Vec::new(),
            foreground_rx: None,
            last_fix: None,
            gps_strength: 0,
            degraded: false,
        }
    }

    /// Bring up the relaxed idle watch so the start guard has a fix.
    ///
    /// Safe to call repeatedly; failures are logged and swallowed because
    /// the idle watch is a convenience, not a session requirement.
    pub fn start_idle_watch(&mut self) {
        self.producer.stop_foreground();
        let (tx, rx) = crossbeam::channel::unbounded();
        match self
            .producer
            .start_foreground(LocationConfig::idle_monitor(), tx)
        {
            Ok(()) => self.foreground_rx = Some(rx),
            Err(e) => tracing::warn!(error = %e, "idle location watch unavailable"),
        }
    }

    /// Start a session.
    ///
    /// Guards: a horse and a training type are bound, foreground location
    /// permission is granted, and a current fix is known. The background
    /// permission is requested during Arming; denial dissolves back to
    /// Idle without touching the store.
    pub fn start(&mut self, params: StartParams) -> Result<(), TrackerError> {
        if self.status != SessionStatus::Idle {
            return Err(TrackerError::AlreadyActive);
        }
        if params.horse_id.trim().is_empty() {
            return Err(TrackerError::HorseNotBound);
        }
        if params.training_type.trim().is_empty() {
            return Err(TrackerError::TrainingNotBound);
        }
        self.require_foreground_permission()?;
        self.pump_foreground();
        if self.last_fix.is_none() {
            return Err(TrackerError::LocationUnknown);
        }

        self.status = SessionStatus::Arming;
        tracing::info!(horse = %params.horse_id, training = %params.training_type, "arming session");

        if self.gate.request(PermissionKind::Background) == PermissionDecision::Denied {
            self.status = SessionStatus::Idle;
            return Err(TrackerError::PermissionDenied(PermissionKind::Background));
        }

        match self.arm(&params) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.rollback_arming();
                Err(e)
            }
        }
    }

    fn require_foreground_permission(&mut self) -> Result<(), TrackerError> {
        match self.gate.status(PermissionKind::Foreground) {
            PermissionStatus::Granted => Ok(()),
            PermissionStatus::Denied => {
                Err(TrackerError::PermissionDenied(PermissionKind::Foreground))
            }
            PermissionStatus::Unknown => {
                if self.gate.request(PermissionKind::Foreground) == PermissionDecision::Granted {
                    Ok(())
                } else {
                    Err(TrackerError::PermissionDenied(PermissionKind::Foreground))
                }
            }
        }
    }

    fn arm(&mut self, params: &StartParams) -> Result<(), TrackerError> {
        self.config = TrackerConfig::for_mode(params.high_precision);

        // Stale background entries from a previous process must not leak
        // into this session's path.
        scratch::write_points(self.scratch.as_ref(), &[])
            .map_err(|e| TrackerError::ScratchIo(e.to_string()))?;

        Self::start_with_retry(|| {
            self.producer
                .start_background(LocationConfig::ride_background(params.high_precision))
        })
        .map_err(|e| TrackerError::ProducerUnavailable(e.to_string()))?;

        self.producer.stop_foreground();
        let (tx, rx) = crossbeam::channel::unbounded();
        let fg_config = LocationConfig::ride_foreground(params.high_precision);
        Self::start_with_retry(|| self.producer.start_foreground(fg_config, tx.clone()))
            .map_err(|e| TrackerError::ProducerUnavailable(e.to_string()))?;
        self.foreground_rx = Some(rx);

        self.session = Some(Session::new(params, self.clock.now_ms()));
        self.buffer = SampleBuffer::new(self.config.mode);
        self.merger = SampleMerger::new();
        self.media.clear();
        self.degraded = false;
        self.status = SessionStatus::Active;
        tracing::info!(mode = ?self.config.mode, "session active");
        Ok(())
    }

    /// One retry inside Arming; the second failure is terminal.
    fn start_with_retry(
        mut attempt: impl FnMut() -> Result<(), LocationError>,
    ) -> Result<(), LocationError> {
        match attempt() {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::warn!(error = %first, "producer start failed, retrying once");
                attempt()
            }
        }
    }

    fn rollback_arming(&mut self) {
        self.producer.stop_background();
        self.producer.stop_foreground();
        self.session = None;
        self.status = SessionStatus::Idle;
        self.start_idle_watch();
    }

    /// Deliver one foreground emission.
    ///
    /// Always refreshes the last-known fix and strength; extends the path
    /// only while Active.
    pub fn handle_sample(&mut self, p: TrackingPoint) {
        if p.is_valid() {
            self.last_fix = Some(p);
            self.gps_strength = gps_strength_bucket(p.accuracy);
        }
        if self.status == SessionStatus::Active {
            self.buffer.append(p);
        }
    }

    /// Drain queued foreground emissions into the state machine.
    pub fn pump_foreground(&mut self) {
        let queued: Vec<TrackingPoint> = match &self.foreground_rx {
            Some(rx) => rx.try_iter().collect(),
            None => return,
        };
        for p in queued {
            self.handle_sample(p);
        }
    }

    /// One merge tick: drain the background scratch into the path and poll
    /// producer health. A tick that observes any state but Active exits
    /// without mutating.
    pub fn merge_tick(&mut self) {
        if self.status != SessionStatus::Active {
            return;
        }

        self.pump_foreground();

        match self.merger.drain(self.scratch.as_ref(), &mut self.buffer) {
            Ok(report) => {
                if report.admitted > 0 {
                    tracing::debug!(admitted = report.admitted, "merged background samples");
                }
            }
            // Skipped this tick; the next one retries.
            Err(e) => tracing::warn!(error = %e, "merge tick skipped"),
        }

        // Background merges can outrun the foreground stream; keep the
        // last-known fix pointed at whichever sample is newest. The path
        // tail alone can be minutes stale next to a rejected fix.
        if let Some(tail) = self.buffer.last() {
            if self.last_fix.map_or(true, |fix| tail.timestamp > fix.timestamp) {
                self.last_fix = Some(*tail);
            }
        }
        if let Some(fix) = self.last_fix {
            self.gps_strength = gps_strength_bucket(fix.accuracy);
        }

        if !self.degraded && !self.producer.is_background_running() {
            // No auto-restart; the session continues on foreground only.
            tracing::warn!("background producer stalled, continuing degraded");
            self.degraded = true;
        }
    }

    /// One notification tick: push the elapsed-time status card.
    pub fn notification_tick(&mut self) {
        if self.status != SessionStatus::Active {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        let elapsed_ms = (self.clock.now_ms() - session.start_time).max(0) as u64;
        let payload = StatusPayload {
            elapsed_seconds: elapsed_ms / 1000,
            horse_name: session.horse_name.clone(),
            training_type: session.training_type.clone(),
        };
        self.ticker.emit(self.notifier.as_mut(), &payload);
    }

    /// Attach a captured photo or video to the active session.
    pub fn attach_media(&mut self, item: MediaItem) -> Result<(), TrackerError> {
        if self.status != SessionStatus::Active {
            return Err(TrackerError::NotActive);
        }
        self.media.push(item);
        Ok(())
    }

    /// Stop the session, finalize statistics, and persist the record.
    ///
    /// Idempotent: in any state but Active this is a no-op returning
    /// `Ok(None)`. A clock regression rejects the session: nothing is
    /// stored, the scratch is cleared, and the error surfaces.
    pub fn stop(&mut self) -> Result<Option<Session>, TrackerError> {
        if self.status != SessionStatus::Active {
            return Ok(None);
        }
        self.status = SessionStatus::Finalizing;
        tracing::info!("finalizing session");

        self.producer.stop_background();

        // Final drain so background samples written moments before the
        // stop still make the path.
        self.pump_foreground();
        if let Err(e) = self.merger.drain(self.scratch.as_ref(), &mut self.buffer) {
            tracing::warn!(error = %e, "final drain failed, path keeps foreground samples only");
        }

        self.producer.stop_foreground();
        self.foreground_rx = None;
        self.ticker.dismiss(self.notifier.as_mut());

        let end_time = self.clock.now_ms();
        let mut session = match self.session.take() {
            Some(s) => s,
            None => {
                self.dissolve();
                return Err(TrackerError::NotActive);
            }
        };

        if end_time < session.start_time {
            let start_ms = session.start_time;
            self.dissolve();
            return Err(TrackerError::ClockAnomaly {
                start_ms,
                end_ms: end_time,
            });
        }

        let path = std::mem::take(&mut self.buffer).into_points();
        session.end_time = Some(end_time);
        session.duration_seconds = Some(((end_time - session.start_time) / 1000) as u64);
        session.distance_meters = Some(polyline_length_m(&path));
        let (avg, max) = speed_stats(&path);
        session.average_speed = Some(avg);
        session.max_speed = Some(max);
        session.path = path;
        if !self.media.is_empty() {
            session.media = Some(std::mem::take(&mut self.media));
        }

        let result = self.store.append_session(session.clone());
        self.dissolve();

        match result {
            Ok(()) => Ok(Some(session)),
            Err(e) => Err(TrackerError::StoreFailed(e.to_string())),
        }
    }

    /// Return to Idle: clear the scratch queue, drop session state, and
    /// put the relaxed watch back up.
    fn dissolve(&mut self) {
        if let Err(e) = scratch::write_points(self.scratch.as_ref(), &[]) {
            tracing::warn!(error = %e, "failed to clear scratch queue");
        }
        self.buffer = SampleBuffer::default();
        self.session = None;
        self.media.clear();
        self.degraded = false;
        self.status = SessionStatus::Idle;
        self.start_idle_watch();
    }

    /// Point-in-time view for observers.
    pub fn snapshot(&self) -> SessionSnapshot {
        let elapsed_seconds = self
            .session
            .as_ref()
            .map(|s| ((self.clock.now_ms() - s.start_time).max(0) / 1000) as u64)
            .unwrap_or(0);
        let path = self.buffer.snapshot();
        let current_speed_mps = match path.as_slice() {
            [] => 0.0,
            [only] => only.speed.unwrap_or(0.0),
            [.., prev, cur] => derived_speed_mps(prev, cur),
        };
        SessionSnapshot {
            status: self.status,
            elapsed_seconds,
            path_len: path.len(),
            distance_meters: polyline_length_m(&path),
            current_speed_mps,
            gps_strength: self.gps_strength,
            degraded: self.degraded,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Active tick configuration; defaults to normal mode while Idle.
    pub fn config(&self) -> TrackerConfig {
        self.config
    }

    /// Most recent valid fix seen from any producer.
    pub fn last_fix(&self) -> Option<TrackingPoint> {
        self.last_fix
    }

    /// Samples dropped for violating the data-model invariants.
    pub fn invalid_sample_count(&self) -> u64 {
        self.buffer.invalid_count()
    }
}

/// Sum of the haversine legs along a path.
fn polyline_length_m(path: &[TrackingPoint]) -> f64 {
    path.windows(2)
        .map(|w| haversine_m(w[0].latitude, w[0].longitude, w[1].latitude, w[1].longitude))
        .sum()
}

/// Average and maximum of the positive speed samples; zeros if none.
fn speed_stats(path: &[TrackingPoint]) -> (f64, f64) {
    let positive: Vec<f64> = path
        .iter()
        .filter_map(|p| p.speed)
        .filter(|&v| v > 0.0)
        .collect();
    if positive.is_empty() {
        return (0.0, 0.0);
    }
    let avg = positive.iter().sum::<f64>() / positive.len() as f64;
    let max = positive.iter().cloned().fold(0.0, f64::max);
    (avg, max)
}
