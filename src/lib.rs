//! EquiTrack - GPS training-session tracker.
//!
//! The session-tracker core of a mobile equestrian-training application.
//! Records a rider's path from two independent location producers (a
//! foreground watcher and a background long-task that survives process
//! suspension), merges the streams into one deduplicated track, derives
//! distance and speed statistics, and persists a durable session record.
//! Platform concerns (location hardware, notifications, permissions, the
//! key/value scratch, the clock) are injected capabilities.

pub mod export;
pub mod geo;
pub mod location;
pub mod platform;
pub mod storage;
pub mod tracking;

// Re-export commonly used types
pub use location::SimulatedProducer;
pub use storage::{FileScratch, MemoryScratch, SessionStore};
pub use tracking::{Session, SessionManager, TrackerRuntime, TrackingPoint};
