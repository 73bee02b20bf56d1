//! Server-side sessions
//!
//! A session is an opaque identifier carried in a cookie plus a small
//! key-value bag kept on the server. Sessions expire after a period of
//! inactivity; the window is per-session so a login can widen it.
//!
//! Storage lives behind the [`SessionStore`] trait:
//! - [`MemorySessionStore`] keeps everything in-process
//! - `RedisSessionStore` (feature `redis`) keeps sessions in Redis
//!
//! Requests touching the same session are serialized through
//! [`SessionLocks`]; requests for different sessions never contend.

mod locks;
#[cfg(feature = "redis")]
mod redis;
mod store;

pub use locks::{SessionLease, SessionLocks};
#[cfg(feature = "redis")]
pub use redis::RedisSessionStore;
pub use store::{MemorySessionStore, SessionStore};

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique session identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session ID
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from a string (validates format)
    ///
    /// # Errors
    ///
    /// Returns error if the string is not a valid UUID
    pub fn try_from_string(s: String) -> Result<Self, SessionError> {
        Uuid::parse_str(&s)
            .map(|_| Self(s))
            .map_err(|_| SessionError::InvalidSessionId)
    }

    /// Get the session ID as a string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from_string(s.to_string())
    }
}

/// Session data stored per-session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// When this session was created
    pub created_at: DateTime<Utc>,
    /// When this session was last accessed
    pub last_accessed: DateTime<Utc>,
    /// Inactivity window in seconds
    pub max_inactive_secs: i64,
    /// Session attributes
    pub data: HashMap<String, serde_json::Value>,
}

impl SessionData {
    /// Create empty session data with the given inactivity window
    #[must_use]
    pub fn new(max_inactive: Duration) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_accessed: now,
            max_inactive_secs: max_inactive.num_seconds(),
            data: HashMap::new(),
        }
    }

    /// When this session expires if it is not accessed again
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.last_accessed + Duration::seconds(self.max_inactive_secs)
    }

    /// Check if session is expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at()
    }

    /// Time left before the session expires, zero if already expired
    #[must_use]
    pub fn remaining(&self) -> Duration {
        (self.expires_at() - Utc::now()).max(Duration::zero())
    }

    /// Record an access, restarting the inactivity window
    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }

    /// Replace the inactivity window, counted from now
    pub fn set_max_inactive(&mut self, window: Duration) {
        self.max_inactive_secs = window.num_seconds();
        self.touch();
    }

    /// Get a value from session data
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set a value in session data
    ///
    /// # Errors
    ///
    /// Returns error if value cannot be serialized to JSON
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<(), SessionError> {
        let json_value = serde_json::to_value(value)?;
        self.data.insert(key.into(), json_value);
        Ok(())
    }

    /// Remove a value and decode it; undecodable values are dropped as well
    pub fn take<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        self.data
            .remove(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Whether the session carries any attributes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Session-related errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Invalid session ID format
    #[error("Invalid session ID")]
    InvalidSessionId,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage backend error
    #[error("Session store error: {0}")]
    Backend(String),
}
