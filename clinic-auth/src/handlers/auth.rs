//! Session-backed identity endpoints

use axum::Json;
use serde_json::{json, Value};

use crate::error::ClinicAuthError;
use crate::extractors::Session;
use crate::oauth2::types::{AuthenticatedUser, USER_SESSION_KEY};

/// Message returned when nobody is logged in
pub const LOGIN_REQUIRED: &str = "Please login (10001)";

/// `GET /auth/me`: the logged-in user
///
/// # Errors
///
/// Returns `Unauthorized` if the session holds no user
pub async fn me(session: Session) -> Result<Json<AuthenticatedUser>, ClinicAuthError> {
    session
        .data()
        .await
        .get::<AuthenticatedUser>(USER_SESSION_KEY)
        .map(Json)
        .ok_or_else(|| ClinicAuthError::Unauthorized(LOGIN_REQUIRED.to_string()))
}

/// `GET /auth/logout`: destroy the session; always succeeds
pub async fn logout(session: Session) -> Json<Value> {
    if let Some(user) = session.data().await.get::<AuthenticatedUser>(USER_SESSION_KEY) {
        tracing::info!(subject = %user.provider_id, "User logged out");
    }
    session.invalidate();
    Json(json!({ "ok": true }))
}
