//! Scripted location producer for tests and the simulator binary.

use std::sync::{Arc, Mutex};

use crate::location::background::BackgroundWriter;
use crate::location::producer::{ForegroundSink, LocationProducer};
use crate::location::types::{LocationConfig, LocationError};
use crate::storage::scratch::Scratch;
use crate::tracking::types::TrackingPoint;

#[derive(Default)]
struct Inner {
    foreground: Option<ForegroundState>,
    background: Option<LocationConfig>,
    writer: Option<BackgroundWriter>,
    /// Remaining start attempts to fail, for exercising the retry path
    fail_starts: u32,
}

struct ForegroundState {
    config: LocationConfig,
    sink: ForegroundSink,
}

/// Location producer driven by the test or simulator script instead of
/// hardware. Clones share state, so the driver half handed to the session
/// manager and the emitting half kept by the script stay in sync.
#[derive(Clone)]
pub struct SimulatedProducer {
    inner: Arc<Mutex<Inner>>,
    scratch: Arc<dyn Scratch>,
}

impl SimulatedProducer {
    pub fn new(scratch: Arc<dyn Scratch>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            scratch,
        }
    }

    /// Make the next `n` start calls fail with `Unavailable`.
    pub fn fail_next_starts(&self, n: u32) {
        self.lock().fail_starts = n;
    }

    /// Deliver a fix through the foreground watcher, honoring nothing but
    /// the subscription being live; rate limits are the platform's
    /// business and the simulator script's responsibility.
    pub fn emit_foreground(&self, point: TrackingPoint) -> bool {
        let inner = self.lock();
        match &inner.foreground {
            Some(fg) => fg.sink.send(point).is_ok(),
            None => false,
        }
    }

    /// Deliver a fix through the background task into the scratch queue.
    pub fn emit_background(&self, point: TrackingPoint) -> Option<TrackingPoint> {
        let inner = self.lock();
        if inner.background.is_none() {
            return None;
        }
        let writer = inner.writer.as_ref()?;
        match writer.push(point) {
            Ok(stamped) => Some(stamped),
            Err(e) => {
                tracing::warn!(error = %e, "simulated background append failed");
                None
            }
        }
    }

    /// Simulate the platform killing the background task without notice.
    pub fn kill_background(&self) {
        let mut inner = self.lock();
        inner.background = None;
        inner.writer = None;
    }

    pub fn is_foreground_running(&self) -> bool {
        self.lock().foreground.is_some()
    }

    /// Config of the live foreground subscription, if any.
    pub fn foreground_config(&self) -> Option<LocationConfig> {
        self.lock().foreground.as_ref().map(|fg| fg.config)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_failure(inner: &mut Inner) -> bool {
        if inner.fail_starts > 0 {
            inner.fail_starts -= 1;
            true
        } else {
            false
        }
    }
}

impl LocationProducer for SimulatedProducer {
    fn start_foreground(
        &mut self,
        config: LocationConfig,
        sink: ForegroundSink,
    ) -> Result<(), LocationError> {
        let mut inner = self.lock();
        if Self::take_failure(&mut inner) {
            return Err(LocationError::Unavailable("scripted failure".into()));
        }
        inner.foreground = Some(ForegroundState { config, sink });
        Ok(())
    }

    fn stop_foreground(&mut self) {
        self.lock().foreground = None;
    }

    fn start_background(&mut self, config: LocationConfig) -> Result<(), LocationError> {
        let mut inner = self.lock();
        if inner.background.is_some() {
            return Err(LocationError::AlreadyRunning);
        }
        if Self::take_failure(&mut inner) {
            return Err(LocationError::Unavailable("scripted failure".into()));
        }
        inner.background = Some(config);
        inner.writer = Some(BackgroundWriter::new(self.scratch.clone()));
        Ok(())
    }

    fn stop_background(&mut self) {
        let mut inner = self.lock();
        inner.background = None;
        inner.writer = None;
    }

    fn is_background_running(&self) -> bool {
        self.lock().background.is_some()
    }
}
