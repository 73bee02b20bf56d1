//! Session extractor
//!
//! The [`Session`] handle is placed in request extensions by
//! `SessionMiddleware`. Handlers mutate the data through it and the
//! middleware writes the result back once the handler has returned.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::ClinicAuthError;
use crate::session::{SessionData, SessionId};

/// Explicit handle on the current request's session
///
/// Cloning is cheap; all clones refer to the same session.
///
/// # Example
///
/// ```rust,ignore
/// use clinic_auth::extractors::Session;
///
/// async fn handler(session: Session) {
///     let mut data = session.data().await;
///     data.set("seen", true)?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionHandle>,
}

#[derive(Debug)]
struct SessionHandle {
    id: SessionId,
    is_new: bool,
    data: Mutex<SessionData>,
    invalidated: AtomicBool,
    rotate_id: AtomicBool,
}

impl Session {
    pub(crate) fn new(id: SessionId, data: SessionData, is_new: bool) -> Self {
        Self {
            inner: Arc::new(SessionHandle {
                id,
                is_new,
                data: Mutex::new(data),
                invalidated: AtomicBool::new(false),
                rotate_id: AtomicBool::new(false),
            }),
        }
    }

    /// Identifier the request arrived with (or the fresh one)
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// Whether the session was created for this request
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.inner.is_new
    }

    /// Lock the session data for reading or writing
    pub async fn data(&self) -> MutexGuard<'_, SessionData> {
        self.inner.data.lock().await
    }

    /// Destroy the session once the response is sent
    pub fn invalidate(&self) {
        self.inner.invalidated.store(true, Ordering::Release);
    }

    /// Keep the data but move it to a fresh identifier once the response is sent
    pub fn rotate_id(&self) {
        self.inner.rotate_id.store(true, Ordering::Release);
    }

    pub(crate) fn is_invalidated(&self) -> bool {
        self.inner.invalidated.load(Ordering::Acquire)
    }

    pub(crate) fn rotation_requested(&self) -> bool {
        self.inner.rotate_id.load(Ordering::Acquire)
    }

    pub(crate) async fn snapshot(&self) -> SessionData {
        self.inner.data.lock().await.clone()
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ClinicAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| ClinicAuthError::Config("Session not initialized".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use chrono::Duration;

    #[tokio::test]
    async fn test_clones_share_data() {
        let session = Session::new(SessionId::generate(), SessionData::new(Duration::minutes(30)), true);
        let clone = session.clone();

        clone.data().await.set("key", "value").unwrap();
        assert_eq!(
            session.data().await.get::<String>("key"),
            Some("value".to_string())
        );

        clone.invalidate();
        assert!(session.is_invalidated());
        assert!(!session.rotation_requested());
    }

    #[tokio::test]
    async fn test_extractor_requires_middleware() {
        let (mut parts, ()) = Request::new(()).into_parts();
        let result = Session::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ClinicAuthError::Config(_))));

        let session = Session::new(SessionId::generate(), SessionData::new(Duration::minutes(30)), false);
        parts.extensions.insert(session.clone());
        let extracted = Session::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(extracted.id(), session.id());
        assert!(!extracted.is_new());
    }
}
