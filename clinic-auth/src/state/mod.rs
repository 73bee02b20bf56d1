//! Application state management

use std::sync::Arc;

use crate::config::ClinicAuthConfig;
use crate::error::ClinicAuthError;
use crate::oauth2::{HttpTokenExchange, LoginFlow, OAuthProvider, TokenExchange};
use crate::session::{MemorySessionStore, SessionLocks, SessionStore};

/// Shared state handed to every handler
///
/// # Example
///
/// ```rust
/// use clinic_auth::{config::ClinicAuthConfig, state::AppState};
///
/// # fn example() -> anyhow::Result<()> {
/// let state = AppState::new(ClinicAuthConfig::default())?;
/// let app = clinic_auth::routes::router(&state);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AppState {
    config: Arc<ClinicAuthConfig>,
    flow: Arc<LoginFlow>,
    sessions: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("flow", &self.flow)
            .field("sessions", &"SessionStore")
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// In-memory sessions and the HTTP token exchange client
    ///
    /// # Errors
    ///
    /// Returns error if the provider HTTP client cannot be built
    pub fn new(config: ClinicAuthConfig) -> Result<Self, ClinicAuthError> {
        Self::with_store(config, Arc::new(MemorySessionStore::new()))
    }

    /// Given session store and the HTTP token exchange client
    ///
    /// # Errors
    ///
    /// Returns error if the provider HTTP client cannot be built
    pub fn with_store(
        config: ClinicAuthConfig,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, ClinicAuthError> {
        let exchange = HttpTokenExchange::new(config.oauth2.get_provider(OAuthProvider::Google))?;
        Ok(Self::with_parts(config, sessions, Arc::new(exchange)))
    }

    /// Fully explicit construction
    #[must_use]
    pub fn with_parts(
        config: ClinicAuthConfig,
        sessions: Arc<dyn SessionStore>,
        exchange: Arc<dyn TokenExchange>,
    ) -> Self {
        let flow = LoginFlow::new(&config, exchange);
        Self {
            config: Arc::new(config),
            flow: Arc::new(flow),
            sessions,
            locks: Arc::new(SessionLocks::new()),
        }
    }

    /// Service configuration
    #[must_use]
    pub fn config(&self) -> &ClinicAuthConfig {
        &self.config
    }

    /// Login flow controller
    #[must_use]
    pub fn flow(&self) -> &LoginFlow {
        &self.flow
    }

    /// Session storage
    #[must_use]
    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.sessions)
    }

    /// Per-session lock registry
    #[must_use]
    pub fn session_locks(&self) -> Arc<SessionLocks> {
        Arc::clone(&self.locks)
    }
}
