//! Location producer driver: foreground watcher and background long-task.

pub mod background;
pub mod producer;
pub mod simulated;
pub mod types;

pub use background::{BackgroundWriter, SCRATCH_POINT_CAP};
pub use producer::{ForegroundSink, LocationProducer};
pub use simulated::SimulatedProducer;
pub use types::{AccuracyClass, LocationConfig, LocationError, PermissionKind};
