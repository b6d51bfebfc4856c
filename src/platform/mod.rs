//! Capabilities the host application injects into the tracker.
//!
//! The tracker core is polymorphic over wall-clock time, notifications,
//! and permission prompts so tests can drive all three deterministically.

use std::sync::atomic::{AtomicI64, Ordering};

use thiserror::Error;

use crate::location::types::PermissionKind;

/// Wall-clock source.
pub trait Clock: Send + Sync {
    /// Current time, epoch milliseconds.
    fn now_ms(&self) -> i64;
}

/// Real wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Hand-driven clock for tests and the simulator.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn advance_ms(&self, delta: i64) {
        self.now_ms.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set_ms(&self, now: i64) {
        self.now_ms.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Notification delivery failed; the tracker logs and moves on.
#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Status-notification surface.
pub trait Notifier: Send {
    fn show(&mut self, id: u32, title: &str, body: &str) -> Result<(), NotifyError>;
    fn dismiss(&mut self, id: u32);
}

/// Outcome of a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Granted,
    Denied,
}

/// Last known state of a permission, without prompting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Unknown,
}

/// Location-permission prompts and state, owned by the host UI.
pub trait PermissionGate: Send {
    /// Prompt for the permission. A denial is terminal for the attempt.
    fn request(&mut self, kind: PermissionKind) -> PermissionDecision;

    /// Current state without prompting.
    fn status(&self, kind: PermissionKind) -> PermissionStatus;
}
