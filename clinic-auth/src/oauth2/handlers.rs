//! OAuth2 HTTP handlers
//!
//! - `GET /oauth/{provider}/login` starts the flow
//! - `GET /oauth/{provider}/callback` completes it
//!
//! Raw query strings are turned into [`LoginRequest`] / [`CallbackRequest`]
//! here so the flow itself only sees validated values.

use axum::{
    extract::{Path, Query, State},
    http::{
        header::{ACCEPT, LOCATION, ORIGIN},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::flow::{AuthorizationGrant, CallbackRequest, LoginRequest, RequestScheme};
use super::types::OAuthProvider;
use crate::error::ClinicAuthError;
use crate::extractors::Session;
use crate::state::AppState;

/// Login query parameters
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Desired post-login destination
    pub to: Option<String>,
    /// Older clients send the destination as `state`
    pub state: Option<String>,
    /// `1` or `true` asks for `{"url": ...}` instead of a redirect
    pub json: Option<String>,
}

impl LoginQuery {
    /// Requested destination; `to` wins over the legacy `state`
    ///
    /// A blank parameter counts as absent, so a blank `to` falls back to
    /// `state`. Either way an unusable value ends up at `/`.
    #[must_use]
    pub fn desired_target(&self) -> Option<&str> {
        fn present(value: Option<&String>) -> Option<&str> {
            value.map(String::as_str).filter(|s| !s.trim().is_empty())
        }
        present(self.to.as_ref()).or_else(|| present(self.state.as_ref()))
    }

    /// Whether the caller wants JSON rather than a redirect
    #[must_use]
    pub fn wants_json(&self, headers: &HeaderMap) -> bool {
        let flag = self
            .json
            .as_deref()
            .map(str::trim)
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        flag || headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.to_ascii_lowercase().contains("application/json"))
    }
}

/// OAuth2 callback query parameters
#[derive(Debug, Default, Deserialize)]
pub struct OAuthCallback {
    /// Authorization code from provider
    pub code: Option<String>,
    /// CSRF state token
    pub state: Option<String>,
    /// Optional error from provider
    pub error: Option<String>,
    /// Optional error description
    pub error_description: Option<String>,
}

/// `302 Found` to `location`
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// Initiate OAuth2 flow
///
/// # Errors
///
/// Returns error if the provider is unknown or not configured
pub async fn initiate_oauth(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
    session: Session,
) -> Result<Response, ClinicAuthError> {
    let provider = provider_name.parse::<OAuthProvider>()?;

    let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
    let request = LoginRequest {
        target: state
            .flow()
            .redirect_policy()
            .resolve(query.desired_target(), origin),
        scheme: RequestScheme::from_headers(&headers),
    };

    let auth_url = {
        let mut data = session.data().await;
        state.flow().initiate(provider, &mut data, request)?
    };

    if query.wants_json(&headers) {
        Ok(Json(json!({ "url": auth_url.as_str() })).into_response())
    } else {
        Ok(found(auth_url.as_str()))
    }
}

/// Handle OAuth2 callback
///
/// On success the session is moved to a fresh identifier before the browser
/// is sent on to its destination.
///
/// # Errors
///
/// Returns error if the state check, the provider exchange or the
/// verification fails
pub async fn handle_oauth_callback(
    State(state): State<AppState>,
    Path(provider_name): Path<String>,
    Query(params): Query<OAuthCallback>,
    headers: HeaderMap,
    session: Session,
) -> Result<Response, ClinicAuthError> {
    let provider = provider_name.parse::<OAuthProvider>()?;

    let request = CallbackRequest {
        state: params.state,
        grant: AuthorizationGrant::from_params(params.code, params.error, params.error_description),
        scheme: RequestScheme::from_headers(&headers),
    };

    let target = {
        let mut data = session.data().await;
        state.flow().complete(provider, &mut data, request).await?
    };
    session.rotate_id();

    Ok(found(target.as_str()))
}
