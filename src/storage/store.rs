//! Durable append-only session store.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::storage::scratch::{self, Scratch, ScratchError};
use crate::tracking::types::Session;

/// Store operation failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Scratch(#[from] ScratchError),

    /// The write failed; the session is held in memory, not retried
    #[error("session {pending} kept in memory after failed write: {source}")]
    WriteFailed {
        pending: usize,
        #[source]
        source: ScratchError,
    },
}

/// Appends completed sessions to the durable list, newest last.
///
/// The read-modify-write cycle is serialized by a process-local mutex. A
/// failed write keeps the session in a pending list; retrying is the
/// caller's decision via [`SessionStore::flush_pending`].
pub struct SessionStore {
    scratch: Arc<dyn Scratch>,
    write_lock: Mutex<Vec<Session>>,
}

impl SessionStore {
    pub fn new(scratch: Arc<dyn Scratch>) -> Self {
        Self {
            scratch,
            write_lock: Mutex::new(Vec::new()),
        }
    }

    /// Append one completed session.
    pub fn append_session(&self, session: Session) -> Result<(), StoreError> {
        let mut pending = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        match Self::append_to_scratch(self.scratch.as_ref(), &session) {
            Ok(()) => {
                tracing::info!(session_id = %session.id, "session stored");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "session write failed, holding in memory");
                pending.push(session);
                Err(StoreError::WriteFailed {
                    pending: pending.len(),
                    source: e,
                })
            }
        }
    }

    fn append_to_scratch(scratch: &dyn Scratch, session: &Session) -> Result<(), ScratchError> {
        let mut sessions = scratch::read_sessions(scratch)?;
        sessions.push(session.clone());
        scratch::write_sessions(scratch, &sessions)
    }

    /// All stored sessions, newest last.
    pub fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        Ok(scratch::read_sessions(self.scratch.as_ref())?)
    }

    /// Sessions held in memory after failed writes.
    pub fn pending_count(&self) -> usize {
        self.write_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Retry the pending sessions, in arrival order.
    ///
    /// Stops at the first failure; the unfinished remainder stays pending.
    /// Returns the number written.
    pub fn flush_pending(&self) -> Result<usize, StoreError> {
        let mut pending = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut written = 0;

        while let Some(session) = pending.first().cloned() {
            match Self::append_to_scratch(self.scratch.as_ref(), &session) {
                Ok(()) => {
                    pending.remove(0);
                    written += 1;
                }
                Err(e) => {
                    return Err(StoreError::WriteFailed {
                        pending: pending.len(),
                        source: e,
                    });
                }
            }
        }

        if written > 0 {
            tracing::info!(written, "flushed pending sessions");
        }
        Ok(written)
    }
}
