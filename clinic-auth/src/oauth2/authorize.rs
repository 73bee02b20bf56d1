//! Provider authorization URL construction

use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl, Scope};

use super::state::StateToken;
use super::types::{OAuthError, ProviderConfig};

/// Scopes requested on every login
pub const SCOPES: [&str; 3] = ["openid", "email", "profile"];

/// Build the URL the browser is sent to for consent
///
/// Requests an authorization code with offline access and a forced consent
/// prompt; `state` carries the session's pending nonce.
///
/// # Errors
///
/// Returns error if the authorization endpoint or callback URL is not a valid URL
pub fn authorization_url(
    config: &ProviderConfig,
    client_id: &str,
    callback_url: &str,
    state: &StateToken,
) -> Result<url::Url, OAuthError> {
    // oauth2 5.0 API: BasicClient::new() only takes ClientId
    let client = BasicClient::new(ClientId::new(client_id.to_string()))
        .set_auth_uri(
            AuthUrl::new(config.auth_url.clone())
                .map_err(|e| OAuthError::InvalidEndpoint(format!("auth URL: {e}")))?,
        )
        .set_redirect_uri(
            RedirectUrl::new(callback_url.to_string())
                .map_err(|e| OAuthError::InvalidEndpoint(format!("redirect URI: {e}")))?,
        );

    let nonce = state.as_str().to_string();
    let mut request = client.authorize_url(move || CsrfToken::new(nonce));
    for scope in SCOPES {
        request = request.add_scope(Scope::new(scope.to_string()));
    }

    let (url, _) = request
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .add_extra_param("include_granted_scopes", "true")
        .url();

    Ok(url)
}
