//! Session middleware for automatic session management
//!
//! Handles session cookie extraction, per-session locking and persistence
//! across requests:
//!
//! - the session named by the cookie is locked for the whole request, so
//!   concurrent requests for one session run one after another
//! - a fresh session is only stored (and its cookie only sent) once it
//!   carries data
//! - invalidated sessions are deleted and their cookie cleared
//! - a rotation request moves the data to a new identifier

use axum::{
    body::Body,
    extract::Request,
    response::{IntoResponse, Response},
};
use http::header::{COOKIE, SET_COOKIE};
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::config::SessionSettings;
use crate::error::ClinicAuthError;
use crate::extractors::Session;
use crate::session::{SessionData, SessionError, SessionId, SessionLocks, SessionStore};
use crate::state::AppState;

/// Layer for session middleware
#[derive(Clone)]
pub struct SessionLayer {
    config: Arc<SessionSettings>,
    store: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
}

impl std::fmt::Debug for SessionLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLayer")
            .field("config", &self.config)
            .field("store", &"SessionStore")
            .field("locks", &self.locks)
            .finish()
    }
}

impl SessionLayer {
    /// Create the layer from application state
    #[must_use]
    pub fn new(state: &AppState) -> Self {
        Self::with_store(
            state.config().session.clone(),
            state.sessions(),
            state.session_locks(),
        )
    }

    /// Create the layer from explicit parts
    #[must_use]
    pub fn with_store(
        config: SessionSettings,
        store: Arc<dyn SessionStore>,
        locks: Arc<SessionLocks>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            locks,
        }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionMiddleware {
            inner,
            config: self.config.clone(),
            store: self.store.clone(),
            locks: self.locks.clone(),
        }
    }
}

/// Session middleware that handles cookie-based sessions
#[derive(Clone)]
pub struct SessionMiddleware<S> {
    inner: S,
    config: Arc<SessionSettings>,
    store: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for SessionMiddleware<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMiddleware")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .field("store", &"SessionStore")
            .finish_non_exhaustive()
    }
}

impl<S> Service<Request> for SessionMiddleware<S>
where
    S: Service<Request, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let config = self.config.clone();
        let store = self.store.clone();
        let locks = self.locks.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let cookie_id = extract_session_id(&req, &config.cookie_name);

            // held until the session has been written back
            let _lease = match &cookie_id {
                Some(id) => Some(locks.acquire(id).await),
                None => None,
            };

            let loaded = match &cookie_id {
                Some(id) => match store.load(id).await {
                    Ok(data) => data,
                    Err(e) => return Ok(ClinicAuthError::from(e).into_response()),
                },
                None => None,
            };

            let session = match (cookie_id.clone(), loaded) {
                (Some(id), Some(mut data)) => {
                    data.touch();
                    Session::new(id, data, false)
                }
                _ => Session::new(
                    SessionId::generate(),
                    SessionData::new(config.idle_timeout()),
                    true,
                ),
            };

            req.extensions_mut().insert(session.clone());

            let mut response = inner.call(req).await?;

            if let Err(e) = persist(
                store.as_ref(),
                &locks,
                &session,
                &config,
                cookie_id.as_ref(),
                &mut response,
            )
            .await
            {
                response = ClinicAuthError::from(e).into_response();
            }

            Ok(response)
        })
    }
}

/// Write the session back and set or clear the cookie
async fn persist(
    store: &dyn SessionStore,
    locks: &SessionLocks,
    session: &Session,
    config: &SessionSettings,
    cookie_id: Option<&SessionId>,
    response: &mut Response<Body>,
) -> Result<(), SessionError> {
    if session.is_invalidated() {
        if !session.is_new() {
            store.delete(session.id()).await?;
        }
        if cookie_id.is_some() {
            clear_session_cookie(response, config);
        }
        return Ok(());
    }

    let data = session.snapshot().await;

    if session.is_new() {
        if data.is_empty() {
            // unknown or expired cookie, unless it was just rotated away
            if cookie_id.is_some_and(|id| !locks.recently_retired(id)) {
                clear_session_cookie(response, config);
            }
            return Ok(());
        }
        store.save(session.id(), &data).await?;
        set_session_cookie(response, session.id(), config);
        return Ok(());
    }

    if session.rotation_requested() {
        let fresh = SessionId::generate();
        store.save(&fresh, &data).await?;
        store.delete(session.id()).await?;
        locks.retire(session.id());
        set_session_cookie(response, &fresh, config);
        tracing::debug!("Session identifier rotated");
    } else {
        store.save(session.id(), &data).await?;
    }

    Ok(())
}

/// Extract session ID from request cookies
fn extract_session_id(req: &Request, cookie_name: &str) -> Option<SessionId> {
    req.headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| name.trim() == cookie_name)
        .and_then(|(_, value)| SessionId::from_str(value.trim()).ok())
}

fn cookie_attributes(config: &SessionSettings) -> String {
    let mut attributes = format!(
        "Path={}; HttpOnly; SameSite={}",
        config.cookie_path,
        config.same_site.as_str()
    );
    if config.secure_cookies {
        attributes.push_str("; Secure");
    }
    attributes
}

/// Set session cookie on response
///
/// The cookie lives for the browser session; expiry is enforced server-side.
fn set_session_cookie(response: &mut Response<Body>, session_id: &SessionId, config: &SessionSettings) {
    let cookie_value = format!(
        "{}={}; {}",
        config.cookie_name,
        session_id.as_str(),
        cookie_attributes(config)
    );

    if let Ok(header_value) = cookie_value.parse() {
        response.headers_mut().append(SET_COOKIE, header_value);
    }
}

/// Tell the browser to drop the session cookie
fn clear_session_cookie(response: &mut Response<Body>, config: &SessionSettings) {
    let cookie_value = format!(
        "{}=; Max-Age=0; {}",
        config.cookie_name,
        cookie_attributes(config)
    );

    if let Ok(header_value) = cookie_value.parse() {
        response.headers_mut().append(SET_COOKIE, header_value);
    }
}
