//! Session storage backends

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{SessionData, SessionError, SessionId};

/// Keyed storage for session data
///
/// Implementations must enforce inactivity expiry on [`load`](Self::load):
/// an expired session is removed and reported as absent. Callers are
/// responsible for touching the session they get back.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a live session
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be reached or the stored data is corrupt
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError>;

    /// Insert or replace a session
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be reached
    async fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), SessionError>;

    /// Remove a session; removing an unknown session is not an error
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be reached
    async fn delete(&self, id: &SessionId) -> Result<(), SessionError>;
}

/// In-process session storage
///
/// Locks are held only for the map operation itself, never across a request.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionData>>,
}

impl MemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired session, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, data| !data.is_expired());
        before - sessions.len()
    }

    /// Number of sessions currently held, expired or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the store holds no sessions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        let found = self.sessions.read().get(id).cloned();
        match found {
            Some(data) if data.is_expired() => {
                self.sessions.write().remove(id);
                tracing::debug!(session_id = %id, "Session expired");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), SessionError> {
        self.sessions.write().insert(id.clone(), data.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        self.sessions.write().remove(id);
        Ok(())
    }
}
