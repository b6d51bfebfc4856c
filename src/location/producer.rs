//! Location producer capability.

use crossbeam::channel::Sender;

use crate::location::types::{LocationConfig, LocationError};
use crate::tracking::types::TrackingPoint;

/// In-process, single-producer delivery channel for foreground emissions.
pub type ForegroundSink = Sender<TrackingPoint>;

/// Platform location API behind the two subscription modes.
///
/// The foreground watcher delivers each emission to the sink on the
/// process's own thread. The background task survives process suspension
/// and communicates only through the persistent scratch; its entry points
/// are idempotent across restarts beyond the scratch append. Producer
/// crashes are observable only through [`is_background_running`] returning
/// false at a later poll.
///
/// [`is_background_running`]: LocationProducer::is_background_running
pub trait LocationProducer: Send {
    fn start_foreground(
        &mut self,
        config: LocationConfig,
        sink: ForegroundSink,
    ) -> Result<(), LocationError>;

    fn stop_foreground(&mut self);

    /// Fails with [`LocationError::AlreadyRunning`] if the platform
    /// reports the task is live; the caller must stop it first.
    fn start_background(&mut self, config: LocationConfig) -> Result<(), LocationError>;

    fn stop_background(&mut self);

    fn is_background_running(&self) -> bool;
}
