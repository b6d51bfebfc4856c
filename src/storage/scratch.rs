//! Persistent key/value scratch.
//!
//! The scratch is the only channel between the background location task
//! and the in-process tracker: the background task appends points here,
//! and the merger drains them after the process resumes. Values are opaque
//! byte strings; everything the tracker stores in them is JSON.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::tracking::types::{Session, TrackingPoint};

/// Background-producer point queue.
pub const KEY_CURRENT_TRACKING_POINTS: &str = "current_tracking_points";
/// Append-only list of completed sessions.
pub const KEY_TRAINING_SESSIONS: &str = "training_sessions";
/// Training-type ids the rider starred (UI concern, stored here for the app).
pub const KEY_FAVORITE_TRAINING_TYPES: &str = "favorite_training_types";

/// Scratch operation failed.
#[derive(Debug, Error)]
pub enum ScratchError {
    #[error("scratch I/O failed: {0}")]
    Io(String),

    #[error("scratch value malformed: {0}")]
    Malformed(String),
}

/// Durable key/value store surviving process suspension.
pub trait Scratch: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ScratchError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), ScratchError>;
    fn remove(&self, key: &str) -> Result<(), ScratchError>;
}

/// Read the background point queue. A missing key is an empty queue.
pub fn read_points(scratch: &dyn Scratch) -> Result<Vec<TrackingPoint>, ScratchError> {
    match scratch.get(KEY_CURRENT_TRACKING_POINTS)? {
        None => Ok(Vec::new()),
        Some(bytes) => {
            serde_json::from_slice(&bytes).map_err(|e| ScratchError::Malformed(e.to_string()))
        }
    }
}

/// Replace the background point queue.
pub fn write_points(scratch: &dyn Scratch, points: &[TrackingPoint]) -> Result<(), ScratchError> {
    let bytes = serde_json::to_vec(points).map_err(|e| ScratchError::Malformed(e.to_string()))?;
    scratch.set(KEY_CURRENT_TRACKING_POINTS, &bytes)
}

/// Read the stored session list. A missing key is an empty list.
pub fn read_sessions(scratch: &dyn Scratch) -> Result<Vec<Session>, ScratchError> {
    match scratch.get(KEY_TRAINING_SESSIONS)? {
        None => Ok(Vec::new()),
        Some(bytes) => {
            serde_json::from_slice(&bytes).map_err(|e| ScratchError::Malformed(e.to_string()))
        }
    }
}

/// Replace the stored session list.
pub fn write_sessions(scratch: &dyn Scratch, sessions: &[Session]) -> Result<(), ScratchError> {
    let bytes = serde_json::to_vec(sessions).map_err(|e| ScratchError::Malformed(e.to_string()))?;
    scratch.set(KEY_TRAINING_SESSIONS, &bytes)
}

/// Read the starred training-type ids.
pub fn read_favorite_training_types(
    scratch: &dyn Scratch,
) -> Result<BTreeSet<String>, ScratchError> {
    match scratch.get(KEY_FAVORITE_TRAINING_TYPES)? {
        None => Ok(BTreeSet::new()),
        Some(bytes) => {
            serde_json::from_slice(&bytes).map_err(|e| ScratchError::Malformed(e.to_string()))
        }
    }
}

/// Replace the starred training-type ids.
pub fn write_favorite_training_types(
    scratch: &dyn Scratch,
    favorites: &BTreeSet<String>,
) -> Result<(), ScratchError> {
    let bytes =
        serde_json::to_vec(favorites).map_err(|e| ScratchError::Malformed(e.to_string()))?;
    scratch.set(KEY_FAVORITE_TRAINING_TYPES, &bytes)
}

/// In-memory scratch for tests and the simulator.
#[derive(Debug, Default)]
pub struct MemoryScratch {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryScratch {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scratch for MemoryScratch {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ScratchError> {
        let values = self
            .values
            .lock()
            .map_err(|e| ScratchError::Io(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), ScratchError> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| ScratchError::Io(e.to_string()))?;
        values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ScratchError> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| ScratchError::Io(e.to_string()))?;
        values.remove(key);
        Ok(())
    }
}

/// File-backed scratch, one file per key.
///
/// Writes go to a temp file first and land with a rename, so a value is
/// either the previous one or the new one, never a torn write.
#[derive(Debug)]
pub struct FileScratch {
    dir: PathBuf,
}

impl FileScratch {
    /// Open a scratch rooted at the given directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ScratchError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| ScratchError::Io(e.to_string()))?;
        Ok(Self { dir })
    }

    /// Open the scratch at the platform data directory.
    pub fn open_default() -> Result<Self, ScratchError> {
        let dirs = directories::ProjectDirs::from("com", "ProvidenceIT", "equitrack")
            .ok_or_else(|| ScratchError::Io("no home directory".to_string()))?;
        Self::open(dirs.data_dir().join("scratch"))
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Scratch for FileScratch {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ScratchError> {
        match std::fs::read(self.key_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ScratchError::Io(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), ScratchError> {
        let path = self.key_path(key);
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        std::fs::write(&tmp, value).map_err(|e| ScratchError::Io(e.to_string()))?;
        std::fs::rename(&tmp, &path).map_err(|e| ScratchError::Io(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<(), ScratchError> {
        match std::fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScratchError::Io(e.to_string())),
        }
    }
}
