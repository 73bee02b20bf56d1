//! Core OAuth2 types and configuration
//!
//! Provider identifiers, per-provider settings, the identity that ends up in
//! the session, and the provider-level error type.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Session key holding the [`AuthenticatedUser`]
pub const USER_SESSION_KEY: &str = "user";

/// OAuth2 provider identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    /// Google OAuth2
    Google,
}

impl OAuthProvider {
    /// Get the provider as a string (lowercase, as used in routes)
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
        }
    }

    /// Human-readable provider name
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Google => "Google",
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            _ => Err(OAuthError::UnknownProvider(s.to_string())),
        }
    }
}

/// Configuration for an OAuth2 provider
///
/// Credentials are optional so the service can start without them; a blank
/// value counts as missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// OAuth2 client ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// OAuth2 client secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Absolute callback URL; synthesized per request when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// Authorization endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
    /// Identity token introspection endpoint
    pub tokeninfo_url: String,
    /// Timeout for each outbound provider call, in milliseconds
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            tokeninfo_url: "https://oauth2.googleapis.com/tokeninfo".to_string(),
            timeout_ms: 5_000,
        }
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl ProviderConfig {
    /// Configured client ID, if not blank
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        non_blank(self.client_id.as_ref())
    }

    /// Configured client secret, if not blank
    #[must_use]
    pub fn client_secret(&self) -> Option<&str> {
        non_blank(self.client_secret.as_ref())
    }

    /// Configured callback URL, if not blank
    #[must_use]
    pub fn redirect_uri(&self) -> Option<&str> {
        non_blank(self.redirect_uri.as_ref())
    }

    /// Provider call timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Complete OAuth2 configuration for all providers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Google OAuth2 configuration
    pub google: ProviderConfig,
}

impl OAuthConfig {
    /// Get configuration for a specific provider
    #[must_use]
    pub const fn get_provider(&self, provider: OAuthProvider) -> &ProviderConfig {
        match provider {
            OAuthProvider::Google => &self.google,
        }
    }
}

/// Tokens returned by the provider's token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    /// Identity token to be verified
    pub id_token: String,
}

/// Claims obtained from a verified identity token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    /// Provider-specific subject identifier
    pub subject: String,
    /// Email address
    pub email: String,
    /// Display name
    pub name: Option<String>,
    /// Avatar URL
    pub picture: Option<String>,
}

/// Identity stored in the session after a successful login
///
/// Serialized as `{id, email, name, picture}`, which is also the body of
/// `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Provider-specific user ID
    #[serde(rename = "id")]
    pub provider_id: String,
    /// Email address
    pub email: String,
    /// Display name, empty when the provider did not supply one
    #[serde(rename = "name", default)]
    pub display_name: String,
    /// Avatar URL, empty when the provider did not supply one
    #[serde(rename = "picture", default)]
    pub avatar_url: String,
}

impl From<IdentityClaims> for AuthenticatedUser {
    fn from(claims: IdentityClaims) -> Self {
        Self {
            provider_id: claims.subject,
            email: claims.email,
            display_name: claims.name.unwrap_or_default(),
            avatar_url: claims.picture.unwrap_or_default(),
        }
    }
}

/// OAuth2 errors
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// Unknown provider
    #[error("Unknown OAuth2 provider: {0}")]
    UnknownProvider(String),

    /// Provider credentials missing
    #[error("{} OAuth not configured", .0.display_name())]
    ProviderNotConfigured(OAuthProvider),

    /// Configured endpoint or callback URL is not a valid URL
    #[error("Invalid OAuth endpoint URL: {0}")]
    InvalidEndpoint(String),

    /// Authorization code exchange failed
    #[error("Failed to exchange OAuth code: {0}")]
    TokenExchangeFailed(String),

    /// Token endpoint answered without an identity token
    #[error("Failed to exchange OAuth code: no id_token in response")]
    MissingIdToken,

    /// Identity token verification failed
    #[error("Failed to verify ID token: {0}")]
    TokenVerificationFailed(String),

    /// Verification response lacks a required claim
    #[error("Failed to verify ID token: no {0} in response")]
    MissingClaim(&'static str),
}
