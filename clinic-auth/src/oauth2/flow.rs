//! Two-leg login state machine
//!
//! ```text
//! ANONYMOUS --login--> PENDING_AUTH --callback ok--> AUTHENTICATED
//!     ^                    |                               |
//!     +----callback err----+-------logout / expiry---------+
//! ```
//!
//! The login leg writes a pending nonce and redirect target into the
//! session. The callback leg consumes both before doing anything else, so
//! a pending state is good for exactly one callback whatever its outcome.
//! The session is only marked authenticated once the identity token has
//! been verified.

use axum::http::HeaderMap;
use std::sync::Arc;

use super::authorize::authorization_url;
use super::exchange::TokenExchange;
use super::redirect::{RedirectPolicy, RedirectTarget, REDIRECT_SESSION_KEY};
use super::state::{StateToken, STATE_SESSION_KEY};
use super::types::{AuthenticatedUser, OAuthConfig, OAuthError, OAuthProvider, USER_SESSION_KEY};
use crate::config::ClinicAuthConfig;
use crate::error::ClinicAuthError;
use crate::session::SessionData;

/// Scheme the browser used to reach us
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestScheme {
    /// Plain HTTP
    #[default]
    Http,
    /// HTTPS, usually terminated at a proxy
    Https,
}

impl RequestScheme {
    /// Read `X-Forwarded-Proto`, defaulting to HTTP
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let forwarded = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim);

        match forwarded {
            Some(proto) if proto.eq_ignore_ascii_case("https") => Self::Https,
            _ => Self::Http,
        }
    }

    /// Scheme as it appears in a URL
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Validated input of the login leg
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Already-validated post-login destination
    pub target: RedirectTarget,
    /// Scheme used to synthesize the callback URL
    pub scheme: RequestScheme,
}

/// What the provider sent back besides `state`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationGrant {
    /// User consented; exchange this code
    Code(String),
    /// Provider reported an error (e.g. `access_denied`)
    Denied {
        /// Provider error code
        error: String,
        /// Optional human-readable detail
        description: Option<String>,
    },
    /// Neither a code nor an error
    Missing,
}

impl AuthorizationGrant {
    /// Build from the raw `code`, `error` and `error_description` parameters
    #[must_use]
    pub fn from_params(
        code: Option<String>,
        error: Option<String>,
        description: Option<String>,
    ) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        match (non_empty(error), non_empty(code)) {
            (Some(error), _) => Self::Denied {
                error,
                description: non_empty(description),
            },
            (None, Some(code)) => Self::Code(code),
            (None, None) => Self::Missing,
        }
    }
}

/// Input of the callback leg
#[derive(Debug, Clone)]
pub struct CallbackRequest {
    /// The `state` parameter as received
    pub state: Option<String>,
    /// Code or provider error
    pub grant: AuthorizationGrant,
    /// Scheme used to synthesize the callback URL
    pub scheme: RequestScheme,
}

/// Login flow controller
pub struct LoginFlow {
    oauth: OAuthConfig,
    base_path: String,
    port: u16,
    authenticated_idle: chrono::Duration,
    redirects: RedirectPolicy,
    exchange: Arc<dyn TokenExchange>,
}

impl std::fmt::Debug for LoginFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginFlow")
            .field("base_path", &self.base_path)
            .field("port", &self.port)
            .field("redirects", &self.redirects)
            .finish_non_exhaustive()
    }
}

impl LoginFlow {
    /// Create the flow from service configuration and a token exchange client
    #[must_use]
    pub fn new(config: &ClinicAuthConfig, exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            oauth: config.oauth2.clone(),
            base_path: config.server.normalized_base_path(),
            port: config.server.port,
            authenticated_idle: config.session.authenticated_idle_timeout(),
            redirects: RedirectPolicy::new(&config.redirects),
            exchange,
        }
    }

    /// Policy applied to requested post-login targets
    #[must_use]
    pub const fn redirect_policy(&self) -> &RedirectPolicy {
        &self.redirects
    }

    /// Callback URL registered with the provider
    ///
    /// The configured absolute URL wins; otherwise one is synthesized from
    /// the request scheme and the server's port.
    #[must_use]
    pub fn callback_url(&self, provider: OAuthProvider, scheme: RequestScheme) -> String {
        self.oauth.get_provider(provider).redirect_uri().map_or_else(
            || {
                format!(
                    "{}://localhost:{}{}/oauth/{}/callback",
                    scheme.as_str(),
                    self.port,
                    self.base_path,
                    provider.as_str()
                )
            },
            ToString::to_string,
        )
    }

    /// Start a login: record the pending state and return the provider URL
    ///
    /// Nothing is written to the session unless the URL could be built.
    ///
    /// # Errors
    ///
    /// Returns error if the provider's client ID is missing or its
    /// endpoints are not valid URLs
    pub fn initiate(
        &self,
        provider: OAuthProvider,
        session: &mut SessionData,
        request: LoginRequest,
    ) -> Result<url::Url, ClinicAuthError> {
        let config = self.oauth.get_provider(provider);
        let client_id = config
            .client_id()
            .ok_or(OAuthError::ProviderNotConfigured(provider))?;

        let callback_url = self.callback_url(provider, request.scheme);
        let state = StateToken::generate();
        let url = authorization_url(config, client_id, &callback_url, &state)?;

        session.set(STATE_SESSION_KEY, &state)?;
        session.set(REDIRECT_SESSION_KEY, &request.target)?;

        tracing::info!(
            provider = %provider,
            custom_target = matches!(request.target, RedirectTarget::Absolute(_)),
            "OAuth2 login initiated"
        );
        Ok(url)
    }

    /// Finish a login: verify `state`, exchange the code and store the user
    ///
    /// Returns where the browser should go next.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if no login is pending or `state` does not match;
    ///   the provider is never contacted in that case
    /// - `BadRequest` if the provider reported an error or sent no code
    /// - provider configuration and communication errors
    pub async fn complete(
        &self,
        provider: OAuthProvider,
        session: &mut SessionData,
        request: CallbackRequest,
    ) -> Result<RedirectTarget, ClinicAuthError> {
        // one-time use, whatever happens next
        let pending: Option<StateToken> = session.take(STATE_SESSION_KEY);
        let target: RedirectTarget = session.take(REDIRECT_SESSION_KEY).unwrap_or_default();

        let state_ok = matches!(
            (&pending, &request.state),
            (Some(expected), Some(received)) if expected.matches(received)
        );
        if !state_ok {
            tracing::warn!(
                provider = %provider,
                pending = pending.is_some(),
                "OAuth2 state validation failed - potential CSRF attack"
            );
            return Err(ClinicAuthError::InvalidState);
        }

        let code = match request.grant {
            AuthorizationGrant::Code(code) => code,
            AuthorizationGrant::Denied { error, description } => {
                tracing::warn!(provider = %provider, %error, "OAuth2 provider returned error");
                return Err(ClinicAuthError::BadRequest(match description {
                    Some(description) => format!("OAuth provider error: {error} ({description})"),
                    None => format!("OAuth provider error: {error}"),
                }));
            }
            AuthorizationGrant::Missing => {
                return Err(ClinicAuthError::BadRequest(
                    "Missing authorization code".to_string(),
                ));
            }
        };

        let config = self.oauth.get_provider(provider);
        let (Some(client_id), Some(client_secret)) = (config.client_id(), config.client_secret())
        else {
            return Err(OAuthError::ProviderNotConfigured(provider).into());
        };
        let callback_url = self.callback_url(provider, request.scheme);

        let tokens = self
            .exchange
            .exchange_code(&code, client_id, client_secret, &callback_url)
            .await
            .inspect_err(|e| tracing::warn!(provider = %provider, error = %e, "Code exchange failed"))?;

        let claims = self
            .exchange
            .verify_identity_token(&tokens.id_token)
            .await
            .inspect_err(|e| tracing::warn!(provider = %provider, error = %e, "ID token verification failed"))?;

        let user = AuthenticatedUser::from(claims);
        session.set(USER_SESSION_KEY, &user)?;
        session.set_max_inactive(self.authenticated_idle);

        tracing::info!(provider = %provider, subject = %user.provider_id, "User logged in");
        Ok(target)
    }
}
