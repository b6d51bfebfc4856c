//! End-to-end session lifecycle tests driven by the manual clock.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::{params, strictly_increasing, Harness, ScriptedGate, SharedNotifier, T0};
use equitrack::geo::haversine_m;
use equitrack::location::{LocationProducer, PermissionKind, SimulatedProducer};
use equitrack::platform::{Clock, ManualClock, PermissionDecision};
use equitrack::storage::{MemoryScratch, Scratch, ScratchError};
use equitrack::tracking::{
    AdmissionMode, MediaItem, MediaKind, Session, SessionStatus, TrackerError, TrackingPoint,
    SESSION_NOTIFICATION_ID,
};
use equitrack::{SessionManager, SessionStore};
use uuid::Uuid;

fn assert_session_invariants(session: &Session, mode: AdmissionMode) {
    assert!(session.is_completed());
    assert!(strictly_increasing(&session.path));

    for pair in session.path.windows(2) {
        let dt = pair[1].timestamp - pair[0].timestamp;
        let dd = haversine_m(
            pair[0].latitude,
            pair[0].longitude,
            pair[1].latitude,
            pair[1].longitude,
        );
        assert!(
            dt >= mode.min_interval_ms() || dd >= mode.min_distance_m(),
            "admission thresholds violated: dt={} dd={}",
            dt,
            dd
        );
    }

    let polyline: f64 = session
        .path
        .windows(2)
        .map(|w| haversine_m(w[0].latitude, w[0].longitude, w[1].latitude, w[1].longitude))
        .sum();
    assert!((session.distance_meters.unwrap() - polyline).abs() < 1e-9);

    let avg = session.average_speed.unwrap();
    let max = session.max_speed.unwrap();
    assert!(max >= avg && avg >= 0.0);
}

#[test]
fn test_static_rider() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();
    assert_eq!(h.manager.status(), SessionStatus::Active);

    // Five fixes at the same spot, 500 ms apart; the first lands at start.
    h.ride_step(0, 37.0, -122.0, Some(0.0));
    for _ in 0..4 {
        h.ride_step(500, 37.0, -122.0, Some(0.0));
    }

    let session = h.manager.stop().unwrap().expect("session persisted");
    assert_eq!(session.path.len(), 5);
    assert_eq!(session.distance_meters, Some(0.0));
    assert_eq!(session.average_speed, Some(0.0));
    assert_eq!(session.max_speed, Some(0.0));
    assert_eq!(session.duration_seconds, Some(2));
    assert_session_invariants(&session, AdmissionMode::Normal);
}

#[test]
fn test_straight_line() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();

    // +0.0001 degrees of latitude (~11.1 m) every second.
    let mut lat = 37.0;
    h.ride_step(0, lat, -122.0, Some(3.0));
    for _ in 0..3 {
        lat += 0.0001;
        h.ride_step(1000, lat, -122.0, Some(3.0));
    }

    let session = h.manager.stop().unwrap().expect("session persisted");
    assert_eq!(session.path.len(), 4);
    let distance = session.distance_meters.unwrap();
    assert!((distance - 33.3).abs() < 0.1, "got {}", distance);
    assert_eq!(session.average_speed, Some(3.0));
    assert_eq!(session.max_speed, Some(3.0));
    assert_session_invariants(&session, AdmissionMode::Normal);
}

#[test]
fn test_foreground_drops_background_fills() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();

    // Foreground delivers the first two fixes.
    h.ride_step(0, 37.0000, -122.0, Some(2.0));
    h.ride_step(500, 37.0001, -122.0, Some(2.0));

    // Process backgrounded: the long-task fills the scratch queue.
    for i in 0..3 {
        h.clock.advance_ms(500);
        let p = h.point(37.0002 + i as f64 * 0.0001, -122.0, Some(2.0));
        h.producer.emit_background(p).expect("background running");
    }

    // Resume: one merge tick drains the queue.
    h.manager.merge_tick();

    let session = h.manager.stop().unwrap().expect("session persisted");
    assert_eq!(session.path.len(), 5);
    assert_session_invariants(&session, AdmissionMode::Normal);

    // Distance equals the five-point polyline: four ~11.1 m legs.
    let distance = session.distance_meters.unwrap();
    assert!((distance - 44.5).abs() < 0.5, "got {}", distance);
}

#[test]
fn test_background_only_survival() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();

    // The foreground sink stays silent for the whole session.
    for i in 0..5 {
        h.clock.advance_ms(500);
        let p = h.point(37.0 + i as f64 * 0.0001, -122.0, Some(2.5));
        h.producer.emit_background(p).expect("background running");
        h.manager.merge_tick();
    }

    let session = h.manager.stop().unwrap().expect("session persisted");
    assert_eq!(session.path.len(), 5);
    assert_session_invariants(&session, AdmissionMode::Normal);
}

#[test]
fn test_timestamp_collision_spatially_spaced() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();

    // Two background emissions share a raw wall-clock stamp but sit ~55 m
    // apart; jitter must split the stamps and both should be admitted.
    let raw_ts = (T0 + 4200) as f64;
    let mk = |lat: f64| TrackingPoint {
        latitude: lat,
        longitude: -122.0,
        timestamp: raw_ts,
        accuracy: Some(5.0),
        speed: None,
    };
    h.producer.emit_background(mk(37.0)).unwrap();
    h.producer.emit_background(mk(37.0005)).unwrap();
    h.manager.merge_tick();

    h.clock.advance_ms(5000);
    let session = h.manager.stop().unwrap().expect("session persisted");
    assert_eq!(session.path.len(), 2);
    assert!(strictly_increasing(&session.path));
}

#[test]
fn test_timestamp_collision_colocated() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();

    // Same raw stamp, same spot: after jitter the second sample clears
    // neither threshold and the admission predicate drops it.
    let raw_ts = (T0 + 4200) as f64;
    let mk = || TrackingPoint {
        latitude: 37.0,
        longitude: -122.0,
        timestamp: raw_ts,
        accuracy: Some(5.0),
        speed: None,
    };
    h.producer.emit_background(mk()).unwrap();
    h.producer.emit_background(mk()).unwrap();
    h.manager.merge_tick();

    h.clock.advance_ms(5000);
    let session = h.manager.stop().unwrap().expect("session persisted");
    assert_eq!(session.path.len(), 1);
}

#[test]
fn test_high_precision_admits_what_normal_drops() {
    // ~0.6 m steps every 250 ms.
    let run = |high_precision: bool| -> Session {
        let mut h = Harness::new();
        h.seed_fix();
        h.manager.start(params(high_precision)).unwrap();

        h.ride_step(0, 37.0, -122.0, Some(2.4));
        for i in 1..4 {
            h.ride_step(250, 37.0 + i as f64 * 0.0000054, -122.0, Some(2.4));
        }
        h.manager.stop().unwrap().expect("session persisted")
    };

    let hp = run(true);
    assert_eq!(hp.path.len(), 4);
    assert_session_invariants(&hp, AdmissionMode::HighPrecision);

    let normal = run(false);
    assert_eq!(normal.path.len(), 1);
}

#[test]
fn test_clock_regression_rejects_session() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();
    h.ride_step(0, 37.0, -122.0, Some(1.0));

    h.clock.set_ms(T0 - 1000);
    let err = h.manager.stop().unwrap_err();
    assert!(matches!(err, TrackerError::ClockAnomaly { .. }));

    // Nothing stored, scratch cleared, machine back in Idle.
    assert!(h.store.list_sessions().unwrap().is_empty());
    assert_eq!(h.manager.status(), SessionStatus::Idle);

    // A subsequent start succeeds.
    h.clock.set_ms(T0 + 10_000);
    h.seed_fix();
    h.manager.start(params(false)).unwrap();
    h.clock.advance_ms(1000);
    let session = h.manager.stop().unwrap().expect("session persisted");
    assert_eq!(session.duration_seconds, Some(1));
    assert_eq!(h.store.list_sessions().unwrap().len(), 1);
}

#[test]
fn test_empty_path_still_persists() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();
    h.clock.advance_ms(5400);

    let session = h.manager.stop().unwrap().expect("session persisted");
    assert!(session.path.is_empty());
    assert_eq!(session.distance_meters, Some(0.0));
    assert_eq!(session.average_speed, Some(0.0));
    assert_eq!(session.max_speed, Some(0.0));
    assert_eq!(session.duration_seconds, Some(5));
    assert_eq!(h.store.list_sessions().unwrap().len(), 1);
}

#[test]
fn test_single_point_path() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();
    h.ride_step(0, 37.0, -122.0, Some(4.2));
    h.clock.advance_ms(3000);

    let session = h.manager.stop().unwrap().expect("session persisted");
    assert_eq!(session.path.len(), 1);
    assert_eq!(session.distance_meters, Some(0.0));
    assert_eq!(session.max_speed, Some(4.2));
    assert_eq!(session.average_speed, Some(4.2));
}

#[test]
fn test_stop_is_idempotent() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();
    h.ride_step(0, 37.0, -122.0, Some(1.0));
    h.clock.advance_ms(1000);

    assert!(h.manager.stop().unwrap().is_some());
    let stored_once = h.store.list_sessions().unwrap();

    // Second stop is a no-op and the store is untouched.
    assert!(h.manager.stop().unwrap().is_none());
    assert_eq!(h.store.list_sessions().unwrap(), stored_once);
}

#[test]
fn test_exactly_one_session_per_cycle() {
    let mut h = Harness::new();
    h.seed_fix();

    for cycle in 0..3 {
        h.manager.start(params(false)).unwrap();
        h.ride_step(0, 37.0, -122.0, Some(1.0));
        h.clock.advance_ms(1000);
        h.manager.stop().unwrap();
        assert_eq!(h.store.list_sessions().unwrap().len(), cycle + 1);
    }
}

#[test]
fn test_background_permission_denied() {
    let mut h = Harness::with_gate(ScriptedGate {
        foreground: PermissionDecision::Granted,
        background: PermissionDecision::Denied,
    });
    h.seed_fix();

    let err = h.manager.start(params(false)).unwrap_err();
    assert!(matches!(
        err,
        TrackerError::PermissionDenied(PermissionKind::Background)
    ));
    assert_eq!(h.manager.status(), SessionStatus::Idle);
    assert!(h.store.list_sessions().unwrap().is_empty());
}

#[test]
fn test_foreground_permission_denied() {
    let mut h = Harness::with_gate(ScriptedGate {
        foreground: PermissionDecision::Denied,
        background: PermissionDecision::Granted,
    });

    let err = h.manager.start(params(false)).unwrap_err();
    assert!(matches!(
        err,
        TrackerError::PermissionDenied(PermissionKind::Foreground)
    ));
}

#[test]
fn test_start_guards() {
    let mut h = Harness::new();

    // No fix yet.
    h.manager.start_idle_watch();
    assert!(matches!(
        h.manager.start(params(false)),
        Err(TrackerError::LocationUnknown)
    ));

    h.seed_fix();

    let mut no_horse = params(false);
    no_horse.horse_id = "  ".into();
    assert!(matches!(
        h.manager.start(no_horse),
        Err(TrackerError::HorseNotBound)
    ));

    let mut no_training = params(false);
    no_training.training_type = String::new();
    assert!(matches!(
        h.manager.start(no_training),
        Err(TrackerError::TrainingNotBound)
    ));

    h.manager.start(params(false)).unwrap();
    assert!(matches!(
        h.manager.start(params(false)),
        Err(TrackerError::AlreadyActive)
    ));
}

#[test]
fn test_producer_unavailable_retry_once() {
    // One scripted failure: the in-Arming retry absorbs it.
    let mut h = Harness::new();
    h.seed_fix();
    h.producer.fail_next_starts(1);
    h.manager.start(params(false)).unwrap();
    assert_eq!(h.manager.status(), SessionStatus::Active);
    h.manager.stop().unwrap();

    // Two scripted failures: the second is terminal.
    let mut h = Harness::new();
    h.seed_fix();
    h.producer.fail_next_starts(2);
    let err = h.manager.start(params(false)).unwrap_err();
    assert!(matches!(err, TrackerError::ProducerUnavailable(_)));
    assert_eq!(h.manager.status(), SessionStatus::Idle);
    assert!(!h.producer.is_background_running());
}

#[test]
fn test_background_stall_degrades_without_restart() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();
    h.ride_step(0, 37.0, -122.0, Some(1.0));
    assert!(!h.manager.snapshot().degraded);

    h.producer.kill_background();
    h.manager.merge_tick();

    let snapshot = h.manager.snapshot();
    assert!(snapshot.degraded);
    // No auto-restart.
    assert!(!h.producer.is_background_running());

    // The session continues on foreground and still persists.
    h.ride_step(1000, 37.0001, -122.0, Some(1.0));
    let session = h.manager.stop().unwrap().expect("session persisted");
    assert_eq!(session.path.len(), 2);
}

#[test]
fn test_merge_tick_survives_scratch_outage() {
    // Scratch that fails reads and writes while the flag is up.
    struct FlakyScratch {
        inner: MemoryScratch,
        fail: AtomicBool,
    }

    impl Scratch for FlakyScratch {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ScratchError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ScratchError::Io("flash unavailable".into()));
            }
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &[u8]) -> Result<(), ScratchError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ScratchError::Io("flash unavailable".into()));
            }
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), ScratchError> {
            self.inner.remove(key)
        }
    }

    let scratch = Arc::new(FlakyScratch {
        inner: MemoryScratch::new(),
        fail: AtomicBool::new(false),
    });
    let producer = SimulatedProducer::new(scratch.clone());
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(SessionStore::new(scratch.clone()));
    let mut manager = SessionManager::new(
        Box::new(producer.clone()),
        Box::new(ScriptedGate::grant_all()),
        Box::new(SharedNotifier::default()),
        clock.clone(),
        scratch.clone(),
        store.clone(),
    );

    manager.start_idle_watch();
    assert!(producer.emit_foreground(TrackingPoint {
        latitude: 37.0,
        longitude: -122.0,
        timestamp: T0 as f64,
        accuracy: Some(5.0),
        speed: Some(0.0),
    }));
    manager.pump_foreground();
    manager.start(params(false)).unwrap();

    clock.advance_ms(500);
    let queued = producer
        .emit_background(TrackingPoint {
            latitude: 37.0005,
            longitude: -122.0,
            timestamp: clock.now_ms() as f64,
            accuracy: Some(5.0),
            speed: Some(2.0),
        })
        .expect("background running");

    // Scratch goes away for one tick: the tick is skipped, nothing lost.
    scratch.fail.store(true, Ordering::SeqCst);
    manager.merge_tick();
    assert_eq!(manager.status(), SessionStatus::Active);
    assert_eq!(manager.snapshot().path_len, 0);

    // The next tick finds the scratch healthy and drains the queue.
    scratch.fail.store(false, Ordering::SeqCst);
    manager.merge_tick();
    assert_eq!(manager.snapshot().path_len, 1);

    clock.advance_ms(1000);
    let session = manager.stop().unwrap().expect("session persisted");
    assert_eq!(session.path.len(), 1);
    assert_eq!(session.path[0].timestamp, queued.timestamp);
    assert_eq!(store.list_sessions().unwrap().len(), 1);
}

#[test]
fn test_strength_tracks_freshest_fix_not_path_tail() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();
    h.ride_step(0, 37.0, -122.0, Some(1.0));
    assert_eq!(h.manager.snapshot().gps_strength, 5);

    // 100 ms later: a valid fix under both thresholds. Rejected from the
    // path, but its accuracy describes the current conditions.
    h.clock.advance_ms(100);
    assert!(h.producer.emit_foreground(TrackingPoint {
        latitude: 37.0,
        longitude: -122.0,
        timestamp: h.clock.now_ms() as f64,
        accuracy: Some(60.0),
        speed: Some(1.0),
    }));
    h.manager.pump_foreground();
    h.manager.merge_tick();

    let snapshot = h.manager.snapshot();
    assert_eq!(snapshot.path_len, 1);
    assert_eq!(snapshot.gps_strength, 2);
}

#[test]
fn test_snapshot_speed_falls_back_to_derived() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();

    // ~11.1 m in one second, no reported speed on either sample.
    h.ride_step(0, 37.0, -122.0, None);
    h.ride_step(1000, 37.0001, -122.0, None);

    let derived = h.manager.snapshot().current_speed_mps;
    assert!((derived - 11.1).abs() < 0.1, "got {}", derived);

    // A reported speed on the newest sample takes precedence.
    h.ride_step(1000, 37.0002, -122.0, Some(3.4));
    assert_eq!(h.manager.snapshot().current_speed_mps, 3.4);
}

#[test]
fn test_late_merge_tick_after_stop_is_inert() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();
    h.ride_step(0, 37.0, -122.0, Some(1.0));
    h.clock.advance_ms(1000);
    h.manager.stop().unwrap();

    // A tick queued before the stop fires now; it must not mutate.
    h.manager.merge_tick();
    h.manager.notification_tick();
    assert_eq!(h.manager.status(), SessionStatus::Idle);
    assert_eq!(h.store.list_sessions().unwrap().len(), 1);
    assert!(h.notifier.shown.lock().unwrap().is_empty());
}

#[test]
fn test_notification_ticks_and_dismissal() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();

    h.clock.advance_ms(65_000);
    h.manager.notification_tick();

    {
        let shown = h.notifier.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        let (id, title, body) = &shown[0];
        assert_eq!(*id, SESSION_NOTIFICATION_ID);
        assert_eq!(title, "Training Comet");
        assert_eq!(body, "trail · 1:05");
    }

    // A failing notifier never affects the session.
    h.notifier.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    h.clock.advance_ms(1000);
    h.manager.notification_tick();
    assert_eq!(h.manager.status(), SessionStatus::Active);

    h.manager.stop().unwrap();
    assert_eq!(
        *h.notifier.dismissed.lock().unwrap(),
        vec![SESSION_NOTIFICATION_ID]
    );
}

#[test]
fn test_media_attaches_only_while_active() {
    let mut h = Harness::new();

    let item = MediaItem {
        id: Uuid::new_v4(),
        uri: "media://photo/42".into(),
        kind: MediaKind::Photo,
        timestamp: T0 + 500,
        location: None,
    };

    assert!(matches!(
        h.manager.attach_media(item.clone()),
        Err(TrackerError::NotActive)
    ));

    h.seed_fix();
    h.manager.start(params(false)).unwrap();
    h.manager.attach_media(item.clone()).unwrap();
    h.clock.advance_ms(1000);

    let session = h.manager.stop().unwrap().expect("session persisted");
    assert_eq!(session.media.as_deref(), Some(&[item][..]));
}

#[test]
fn test_stored_session_round_trips() {
    let mut h = Harness::new();
    h.seed_fix();
    h.manager.start(params(false)).unwrap();
    h.ride_step(0, 37.0, -122.0, Some(2.0));
    h.ride_step(1000, 37.0001, -122.0, Some(2.5));

    let session = h.manager.stop().unwrap().expect("session persisted");
    let stored = h.store.list_sessions().unwrap();
    assert_eq!(stored, vec![session]);
}
