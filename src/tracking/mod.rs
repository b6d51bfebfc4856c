//! Session tracking: buffer, merger, lifecycle state machine, tick driver.

pub mod buffer;
pub mod merger;
pub mod runtime;
pub mod session;
pub mod ticker;
pub mod types;

pub use buffer::{Admission, AdmissionMode, SampleBuffer};
pub use merger::{MergeReport, SampleMerger};
pub use runtime::TrackerRuntime;
pub use session::SessionManager;
pub use ticker::{NotificationTicker, StatusPayload, SESSION_NOTIFICATION_ID};
pub use types::{
    MediaItem, MediaKind, Session, SessionSnapshot, SessionStatus, StartParams, TrackerConfig,
    TrackerError, TrackingPoint,
};
