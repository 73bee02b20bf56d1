//! clinic-auth: OAuth2 login and server-side sessions for the clinic records backend
//!
//! The service runs the authorization-code flow against Google and keeps
//! the resulting identity in a server-side session referenced by a cookie:
//!
//! 1. `GET /oauth/google/login?to=...` stores a one-time state token and the
//!    validated post-login target, then redirects to the provider
//! 2. `GET /oauth/google/callback?code=...&state=...` checks the state token,
//!    exchanges the code, verifies the identity token and stores the user
//! 3. `GET /auth/me` returns the user, `GET /auth/logout` destroys the session
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use clinic_auth::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClinicAuthConfig::load()?;
//!     let state = AppState::new(config)?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, router(&state)).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `redis` - Redis session storage (default)

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod oauth2;
pub mod observability;
pub mod routes;
pub mod session;
pub mod state;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! ```rust
    //! use clinic_auth::prelude::*;
    //! ```

    pub use crate::config::ClinicAuthConfig;
    pub use crate::error::ClinicAuthError;
    pub use crate::extractors::Session;
    pub use crate::middleware::SessionLayer;
    pub use crate::oauth2::{
        AuthenticatedUser, HttpTokenExchange, LoginFlow, OAuthError, OAuthProvider,
        RedirectPolicy, RedirectTarget, TokenExchange,
    };
    pub use crate::routes::router;
    pub use crate::session::{MemorySessionStore, SessionData, SessionId, SessionStore};
    pub use crate::state::AppState;

    #[cfg(feature = "redis")]
    pub use crate::session::RedisSessionStore;
}
