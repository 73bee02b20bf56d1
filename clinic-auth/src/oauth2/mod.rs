//! OAuth2 authorization-code login
//!
//! The login leg stores a one-time [`StateToken`] and a validated
//! [`RedirectTarget`] in the session and sends the browser to the provider.
//! The callback leg checks the token before any network call, exchanges the
//! code, verifies the identity token and stores the [`AuthenticatedUser`].
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{routing::get, Router};
//! use clinic_auth::oauth2::handlers::{handle_oauth_callback, initiate_oauth};
//!
//! let app = Router::new()
//!     .route("/oauth/{provider}/login", get(initiate_oauth))
//!     .route("/oauth/{provider}/callback", get(handle_oauth_callback));
//! ```

pub mod authorize;
pub mod exchange;
pub mod flow;
pub mod handlers;
pub mod redirect;
pub mod state;
pub mod types;

pub use exchange::{HttpTokenExchange, TokenExchange};
pub use flow::{AuthorizationGrant, CallbackRequest, LoginFlow, LoginRequest, RequestScheme};
pub use redirect::{RedirectPolicy, RedirectRejection, RedirectSettings, RedirectTarget};
pub use state::StateToken;
pub use types::{
    AuthenticatedUser, IdentityClaims, OAuthConfig, OAuthError, OAuthProvider, ProviderConfig,
    TokenSet,
};
