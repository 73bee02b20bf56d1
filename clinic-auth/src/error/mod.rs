//! Error types and HTTP error mapping
//!
//! Every failure leaves the service as `{"message": "..."}` with a status
//! code chosen by [`ClinicAuthError::status`]. Redirect-target problems are
//! deliberately absent here: they are downgraded to the default target and
//! never reach the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::oauth2::types::OAuthError;
use crate::session::SessionError;

/// Service error type
#[derive(Debug, Error)]
pub enum ClinicAuthError {
    /// Provider credentials or endpoints missing or unusable
    #[error("{0}")]
    Config(String),

    /// Callback `state` absent, mismatched, or no login pending
    #[error("Invalid OAuth state")]
    InvalidState,

    /// Malformed request that passed the CSRF check
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No authenticated user in the session
    #[error("{0}")]
    Unauthorized(String),

    /// OAuth2 provider error
    #[error(transparent)]
    OAuth(#[from] OAuthError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl ClinicAuthError {
    /// HTTP status for this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidState | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::OAuth(OAuthError::UnknownProvider(_)) => StatusCode::NOT_FOUND,
            Self::Config(_) | Self::OAuth(_) | Self::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ClinicAuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2::types::OAuthProvider;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ClinicAuthError::InvalidState.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ClinicAuthError::Unauthorized("Please login (10001)".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ClinicAuthError::OAuth(OAuthError::ProviderNotConfigured(OAuthProvider::Google))
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ClinicAuthError::OAuth(OAuthError::UnknownProvider("myspace".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ClinicAuthError::OAuth(OAuthError::MissingIdToken).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_provider_detail_is_kept_in_message() {
        let err = ClinicAuthError::from(OAuthError::TokenExchangeFailed(
            "HTTP 400 Bad Request: invalid_grant".into(),
        ));
        assert_eq!(
            err.to_string(),
            "Failed to exchange OAuth code: HTTP 400 Bad Request: invalid_grant"
        );
    }

    #[tokio::test]
    async fn test_into_response_has_json_message() {
        let response = ClinicAuthError::InvalidState.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "message": "Invalid OAuth state" }));
    }
}
