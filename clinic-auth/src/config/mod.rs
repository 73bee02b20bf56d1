//! Configuration management for clinic-auth
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Provider credentials under their conventional names (highest priority):
//!    `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`, `GOOGLE_REDIRECT_URI`,
//!    and `CORS_ALLOWED_ORIGINS`
//! 2. Environment variables with the `CLINIC_` prefix, `__` for nesting
//!    (e.g. `CLINIC_SERVER__PORT=9000`)
//! 3. `./config.toml`
//! 4. `/etc/clinic-auth/config.toml`
//! 5. Hardcoded defaults
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! port = 8080
//! base_path = "/api"
//!
//! [session]
//! cookie_name = "CLINIC_SESSION"
//! idle_timeout_secs = 1800
//!
//! [oauth2.google]
//! client_id = "1234.apps.googleusercontent.com"
//! client_secret = "..."
//! redirect_uri = "https://clinic.example.com/api/oauth/google/callback"
//!
//! [cors]
//! allowed_origins = ["https://clinic.example.com"]
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::oauth2::redirect::RedirectSettings;
use crate::oauth2::types::OAuthConfig;

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to bind
    pub host: String,

    /// Port to bind; also used when synthesizing callback URLs
    pub port: u16,

    /// Prefix every route is mounted under
    pub base_path: String,

    /// Whole-request timeout in milliseconds; keep it above twice the
    /// provider `timeout_ms`, a callback makes two provider calls
    pub request_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_path: "/api".to_string(),
            request_timeout_ms: 15_000,
        }
    }
}

impl ServerSettings {
    /// Request timeout as a `Duration`
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// `base_path` normalized to either `""` or `/segment` without a trailing slash
    #[must_use]
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }
}

/// Session cookie and lifetime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Cookie carrying the session ID
    pub cookie_name: String,

    /// Cookie path
    pub cookie_path: String,

    /// Mark the cookie `Secure` (HTTPS only)
    pub secure_cookies: bool,

    /// Cookie `SameSite` policy
    pub same_site: SameSitePolicy,

    /// Inactivity window for sessions that are not logged in
    pub idle_timeout_secs: u64,

    /// Inactivity window applied on successful login
    pub authenticated_idle_timeout_secs: u64,

    /// Interval of the in-memory expiry sweep, 0 disables it
    pub sweep_interval_secs: u64,

    /// Redis URL; when set (and the `redis` feature is on) sessions live in Redis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "CLINIC_SESSION".to_string(),
            cookie_path: "/".to_string(),
            secure_cookies: !cfg!(debug_assertions),
            same_site: SameSitePolicy::Lax,
            idle_timeout_secs: 1800,
            authenticated_idle_timeout_secs: 3600,
            sweep_interval_secs: 300,
            redis_url: None,
        }
    }
}

impl SessionSettings {
    /// Inactivity window for anonymous and pending sessions
    #[must_use]
    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.idle_timeout_secs).unwrap_or(i64::MAX))
    }

    /// Inactivity window for authenticated sessions
    #[must_use]
    pub fn authenticated_idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(
            i64::try_from(self.authenticated_idle_timeout_secs).unwrap_or(i64::MAX),
        )
    }
}

/// Cookie `SameSite` policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    /// Strict `SameSite` policy
    Strict,
    /// Lax `SameSite` policy; the provider redirect back is a top-level GET so
    /// the cookie still arrives on the callback
    #[default]
    Lax,
    /// None `SameSite` policy (requires secure cookies)
    None,
}

impl SameSitePolicy {
    /// Convert to cookie attribute string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// Cross-origin settings for the browser client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    /// Allowed origins; empty or `*` mirrors the caller's origin.
    /// Accepts a list or a comma-separated string.
    #[serde(deserialize_with = "comma_separated")]
    pub allowed_origins: Vec<String>,
}

fn comma_separated<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let entries = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(entry) => vec![entry],
        OneOrMany::Many(entries) => entries,
    };

    Ok(entries
        .iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(ToString::to_string)
        .collect())
}

impl CorsSettings {
    /// Whether any origin is accepted
    #[must_use]
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o.trim() == "*")
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicAuthConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Session settings
    #[serde(default)]
    pub session: SessionSettings,

    /// OAuth2 provider settings
    #[serde(default)]
    pub oauth2: OAuthConfig,

    /// Post-login redirect policy
    #[serde(default)]
    pub redirects: RedirectSettings,

    /// CORS settings
    #[serde(default)]
    pub cors: CorsSettings,
}

impl ClinicAuthConfig {
    /// Load configuration from the standard locations and the environment
    ///
    /// # Errors
    ///
    /// Returns error if a source cannot be parsed into the configuration types
    pub fn load() -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let system_config = PathBuf::from("/etc/clinic-auth/config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        let local_config = PathBuf::from("./config.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        let config = Self::with_environment(figment).extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file plus the environment
    ///
    /// # Errors
    ///
    /// Returns error if the file or environment cannot be parsed
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()));
        let config = Self::with_environment(figment).extract()?;
        Ok(config)
    }

    /// Whether a callback's two provider calls can outlast the request timeout
    #[must_use]
    pub fn request_timeout_too_short(&self) -> bool {
        let provider = self.oauth2.google.timeout();
        self.server.request_timeout() <= provider.saturating_mul(2)
    }

    fn with_environment(figment: Figment) -> Figment {
        figment
            .merge(Env::prefixed("CLINIC_").split("__").lowercase(true))
            .merge(Self::conventional_env())
    }

    /// Provider and CORS variables under the names deployments already use
    fn conventional_env() -> Env {
        Env::raw()
            .only(&[
                "GOOGLE_CLIENT_ID",
                "GOOGLE_CLIENT_SECRET",
                "GOOGLE_REDIRECT_URI",
                "CORS_ALLOWED_ORIGINS",
            ])
            .map(|key| {
                let key = key.as_str().to_ascii_lowercase();
                match key.strip_prefix("google_") {
                    Some(field) => format!("oauth2.google.{field}").into(),
                    None => "cors.allowed_origins".into(),
                }
            })
    }
}
