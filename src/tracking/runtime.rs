//! Async driver for the synchronous session state machine.
//!
//! The runtime owns the tracker's periodic work:
//! foreground sink pumping, merge ticks, notification ticks. Each task
//! takes the manager lock, advances the machine, publishes a snapshot, and
//! releases; a tick that lands after stop observes a non-Active machine
//! and exits without mutating.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::tracking::session::SessionManager;
use crate::tracking::types::{
    Session, SessionSnapshot, SessionStatus, StartParams, TrackerError,
};

/// Cadence of the foreground sink pump, independent of the merge tick.
const PUMP_INTERVAL_MS: u64 = 100;

/// Runs the tick loops for an active session and streams snapshots.
pub struct TrackerRuntime {
    manager: Arc<Mutex<SessionManager>>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    tasks: Vec<JoinHandle<()>>,
}

impl TrackerRuntime {
    pub fn new(manager: SessionManager) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            manager: Arc::new(Mutex::new(manager)),
            snapshot_tx,
            tasks: Vec::new(),
        }
    }

    /// Snapshot stream for observers; updated on every tick.
    pub fn observe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Direct access for host calls outside the tick loops (media
    /// attachment, idle-watch setup, diagnostics).
    pub fn manager(&self) -> MutexGuard<'_, SessionManager> {
        lock(&self.manager)
    }

    /// Start a session and bring up the tick loops.
    pub fn start_session(&mut self, params: StartParams) -> Result<(), TrackerError> {
        let config = {
            let mut manager = lock(&self.manager);
            manager.start(params)?;
            self.snapshot_tx.send_replace(manager.snapshot());
            manager.config()
        };

        self.spawn_tick(PUMP_INTERVAL_MS, |m| m.pump_foreground());
        self.spawn_tick(config.merge_tick_ms, |m| m.merge_tick());
        self.spawn_tick(config.notification_tick_ms, |m| m.notification_tick());
        Ok(())
    }

    fn spawn_tick(
        &mut self,
        interval_ms: u64,
        tick: impl Fn(&mut SessionManager) + Send + 'static,
    ) {
        let manager = self.manager.clone();
        let snapshot_tx = self.snapshot_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let mut m = lock(&manager);
                if m.status() != SessionStatus::Active {
                    break;
                }
                tick(&mut m);
                snapshot_tx.send_replace(m.snapshot());
            }
        }));
    }

    /// Stop the session, tear down the tick loops, and return the
    /// persisted record. Idempotent like the manager's `stop`.
    pub fn stop_session(&mut self) -> Result<Option<Session>, TrackerError> {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let mut manager = lock(&self.manager);
        let result = manager.stop();
        self.snapshot_tx.send_replace(manager.snapshot());
        result
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
