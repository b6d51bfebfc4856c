//! Shared fakes and harness for tracker integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use equitrack::location::{PermissionKind, SimulatedProducer};
use equitrack::platform::{
    Clock, ManualClock, Notifier, NotifyError, PermissionDecision, PermissionGate, PermissionStatus,
};
use equitrack::storage::MemoryScratch;
use equitrack::tracking::{StartParams, TrackingPoint};
use equitrack::{SessionManager, SessionStore};

/// Permission gate with scripted answers.
pub struct ScriptedGate {
    pub foreground: PermissionDecision,
    pub background: PermissionDecision,
}

impl ScriptedGate {
    pub fn grant_all() -> Self {
        Self {
            foreground: PermissionDecision::Granted,
            background: PermissionDecision::Granted,
        }
    }
}

impl PermissionGate for ScriptedGate {
    fn request(&mut self, kind: PermissionKind) -> PermissionDecision {
        match kind {
            PermissionKind::Foreground => self.foreground,
            PermissionKind::Background => self.background,
        }
    }

    fn status(&self, kind: PermissionKind) -> PermissionStatus {
        let decision = match kind {
            PermissionKind::Foreground => self.foreground,
            PermissionKind::Background => self.background,
        };
        match decision {
            PermissionDecision::Granted => PermissionStatus::Granted,
            PermissionDecision::Denied => PermissionStatus::Denied,
        }
    }
}

/// Notifier whose deliveries the test can inspect after the manager takes
/// ownership of its clone.
#[derive(Clone, Default)]
pub struct SharedNotifier {
    pub shown: Arc<Mutex<Vec<(u32, String, String)>>>,
    pub dismissed: Arc<Mutex<Vec<u32>>>,
    pub fail: Arc<AtomicBool>,
}

impl Notifier for SharedNotifier {
    fn show(&mut self, id: u32, title: &str, body: &str) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError("scripted failure".into()));
        }
        self.shown
            .lock()
            .unwrap()
            .push((id, title.to_string(), body.to_string()));
        Ok(())
    }

    fn dismiss(&mut self, id: u32) {
        self.dismissed.lock().unwrap().push(id);
    }
}

/// Everything a scenario needs, wired the way the host app wires it.
pub struct Harness {
    pub scratch: Arc<MemoryScratch>,
    pub producer: SimulatedProducer,
    pub clock: Arc<ManualClock>,
    pub store: Arc<SessionStore>,
    pub notifier: SharedNotifier,
    pub manager: SessionManager,
}

/// Scenario clocks start here so every timestamp stays strictly positive.
pub const T0: i64 = 100_000;

impl Harness {
    pub fn new() -> Self {
        Self::with_gate(ScriptedGate::grant_all())
    }

    pub fn with_gate(gate: ScriptedGate) -> Self {
        let scratch = Arc::new(MemoryScratch::new());
        let producer = SimulatedProducer::new(scratch.clone());
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(SessionStore::new(scratch.clone()));
        let notifier = SharedNotifier::default();

        let manager = SessionManager::new(
            Box::new(producer.clone()),
            Box::new(gate),
            Box::new(notifier.clone()),
            clock.clone(),
            scratch.clone(),
            store.clone(),
        );

        Self {
            scratch,
            producer,
            clock,
            store,
            notifier,
            manager,
        }
    }

    /// Bring up the idle watch and deliver one fix so the start guard has
    /// a current location.
    pub fn seed_fix(&mut self) {
        self.manager.start_idle_watch();
        let p = self.point(37.0, -122.0, Some(0.0));
        assert!(self.producer.emit_foreground(p));
        self.manager.pump_foreground();
    }

    /// A point stamped with the current manual-clock time.
    pub fn point(&self, lat: f64, lon: f64, speed: Option<f64>) -> TrackingPoint {
        TrackingPoint {
            latitude: lat,
            longitude: lon,
            timestamp: self.clock.now_ms() as f64,
            accuracy: Some(5.0),
            speed,
        }
    }

    /// Advance the clock, then deliver a foreground fix and pump it in.
    pub fn ride_step(&mut self, advance_ms: i64, lat: f64, lon: f64, speed: Option<f64>) {
        self.clock.advance_ms(advance_ms);
        let p = self.point(lat, lon, speed);
        assert!(self.producer.emit_foreground(p));
        self.manager.pump_foreground();
    }
}

pub fn params(high_precision: bool) -> StartParams {
    StartParams {
        user_id: "rider-1".into(),
        horse_id: "horse-1".into(),
        horse_name: "Comet".into(),
        training_type: "trail".into(),
        high_precision,
    }
}

/// Strictly increasing timestamps, i.e. sorted with no duplicates.
pub fn strictly_increasing(points: &[TrackingPoint]) -> bool {
    points.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}
