//! EquiTrack simulator.
//!
//! Runs a scripted training session against the simulated location
//! producer: a foreground stretch, a process-suspension stretch covered by
//! the background task, then stop and persistence. Useful for exercising
//! the whole tracker without a device.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use equitrack::export::export_gpx;
use equitrack::location::{PermissionKind, SimulatedProducer};
use equitrack::platform::{
    Clock, Notifier, NotifyError, PermissionDecision, PermissionGate, PermissionStatus,
    SystemClock,
};
use equitrack::storage::MemoryScratch;
use equitrack::tracking::{StartParams, TrackingPoint};
use equitrack::{SessionManager, SessionStore, TrackerRuntime};

/// Gate that grants everything, as a rider with permissions set up would.
struct GrantAll;

impl PermissionGate for GrantAll {
    fn request(&mut self, _kind: PermissionKind) -> PermissionDecision {
        PermissionDecision::Granted
    }
    fn status(&self, _kind: PermissionKind) -> PermissionStatus {
        PermissionStatus::Granted
    }
}

/// Notifier that logs the status card instead of showing one.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&mut self, _id: u32, title: &str, body: &str) -> Result<(), NotifyError> {
        tracing::info!(%title, %body, "status notification");
        Ok(())
    }
    fn dismiss(&mut self, _id: u32) {
        tracing::info!("status notification dismissed");
    }
}

fn fix(clock: &dyn Clock, lat: f64, speed: f64) -> TrackingPoint {
    TrackingPoint {
        latitude: lat,
        longitude: -122.03,
        timestamp: clock.now_ms() as f64,
        accuracy: Some(6.0),
        speed: Some(speed),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting EquiTrack simulator v{}", env!("CARGO_PKG_VERSION"));

    let scratch = Arc::new(MemoryScratch::new());
    let producer = SimulatedProducer::new(scratch.clone());
    let store = Arc::new(SessionStore::new(scratch.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let manager = SessionManager::new(
        Box::new(producer.clone()),
        Box::new(GrantAll),
        Box::new(LogNotifier),
        clock.clone(),
        scratch,
        store.clone(),
    );
    let mut runtime = TrackerRuntime::new(manager);

    // Idle watch gives the start guard its current fix.
    {
        let mut m = runtime.manager();
        m.start_idle_watch();
        producer.emit_foreground(fix(clock.as_ref(), 37.3300, 0.0));
        m.pump_foreground();
    }

    runtime.start_session(StartParams {
        user_id: "rider-demo".into(),
        horse_id: "horse-demo".into(),
        horse_name: "Comet".into(),
        training_type: "trail".into(),
        high_precision: true,
    })?;

    let mut lat = 37.3300;

    // Foreground stretch: a steady trot north.
    for _ in 0..10 {
        lat += 0.0001;
        producer.emit_foreground(fix(clock.as_ref(), lat, 3.1));
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    // Process suspension: the foreground watcher goes quiet and the
    // background task fills the scratch queue.
    tracing::info!("simulating process suspension");
    for _ in 0..5 {
        lat += 0.0001;
        if producer.emit_background(fix(clock.as_ref(), lat, 2.8)).is_none() {
            tracing::warn!("background task not running, fix dropped");
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    // Leave room for a merge tick after the last background write.
    tokio::time::sleep(Duration::from_millis(700)).await;

    let snapshot = runtime.observe().borrow().clone();
    tracing::info!(
        path_len = snapshot.path_len,
        distance_m = format!("{:.1}", snapshot.distance_meters),
        speed_mps = format!("{:.2}", snapshot.current_speed_mps),
        gps_strength = snapshot.gps_strength,
        "pre-stop snapshot"
    );

    match runtime.stop_session()? {
        Some(session) => {
            tracing::info!(
                session_id = %session.id,
                duration_s = session.duration_seconds.unwrap_or(0),
                distance_m = format!("{:.1}", session.distance_meters.unwrap_or(0.0)),
                avg_speed = format!("{:.2}", session.average_speed.unwrap_or(0.0)),
                max_speed = format!("{:.2}", session.max_speed.unwrap_or(0.0)),
                points = session.path.len(),
                "session completed"
            );
            let gpx = export_gpx(&session)?;
            tracing::info!(gpx_bytes = gpx.len(), "gpx export rendered");
        }
        None => tracing::warn!("no session was active"),
    }

    let stored = store.list_sessions()?;
    tracing::info!(stored = stored.len(), "sessions in store");
    Ok(())
}
