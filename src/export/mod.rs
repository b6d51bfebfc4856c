//! Export of completed sessions to interchange formats.

pub mod gpx;

use thiserror::Error;

pub use gpx::export_gpx;

/// Errors during session export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Only completed sessions can be exported
    #[error("session has not been completed")]
    SessionNotCompleted,

    /// Failed to write export data
    #[error("failed to write data: {0}")]
    WriteFailed(String),
}
