//! Post-login redirect target validation
//!
//! A caller-supplied destination is only honoured when it is an absolute URL
//! whose origin equals the calling page's `Origin` header or one of the
//! configured local-development origins. Anything else resolves to `"/"`.
//!
//! Unlike the CSRF check, which rejects the request, this check fails open to
//! the safe default: a bad `to` parameter never breaks the login.

use serde::{Deserialize, Serialize};
use url::{Origin, Url};

/// Session key holding the pending [`RedirectTarget`]
pub const REDIRECT_SESSION_KEY: &str = "oauth_redirect";

/// Redirect policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectSettings {
    /// Origins always accepted as post-login targets (local frontends)
    pub dev_origins: Vec<String>,
}

impl Default for RedirectSettings {
    fn default() -> Self {
        Self {
            dev_origins: [
                "http://localhost:5173",
                "https://localhost:5173",
                "http://localhost:5174",
                "https://localhost:5174",
                "http://127.0.0.1:5173",
                "http://127.0.0.1:5174",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Where the browser goes once login completes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum RedirectTarget {
    /// The literal default path `/`
    #[default]
    Root,
    /// A validated absolute URL
    Absolute(Url),
}

impl RedirectTarget {
    /// Target as a `Location` value
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Root => "/",
            Self::Absolute(url) => url.as_str(),
        }
    }
}

impl std::fmt::Display for RedirectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RedirectTarget> for String {
    fn from(target: RedirectTarget) -> Self {
        match target {
            RedirectTarget::Root => "/".to_string(),
            RedirectTarget::Absolute(url) => url.into(),
        }
    }
}

// Stored targets were validated when written; an unreadable one falls back to `/`.
impl From<String> for RedirectTarget {
    fn from(stored: String) -> Self {
        Url::parse(&stored).map_or(Self::Root, Self::Absolute)
    }
}

/// Why a requested target was replaced by `/`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RedirectRejection {
    /// No target requested
    #[error("no target requested")]
    Missing,
    /// Not an absolute URL
    #[error("target is not an absolute URL")]
    Unparseable,
    /// URL without a host
    #[error("target has no host")]
    NoHost,
    /// Origin matches neither the caller nor the development allow-list
    #[error("target origin is not allowed")]
    ForeignOrigin,
}

/// Compiled redirect allow-list
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    dev_origins: Vec<Origin>,
}

impl RedirectPolicy {
    /// Build the policy, skipping allow-list entries that are not URLs
    #[must_use]
    pub fn new(settings: &RedirectSettings) -> Self {
        let dev_origins = settings
            .dev_origins
            .iter()
            .filter_map(|entry| match Url::parse(entry) {
                Ok(url) => Some(url.origin()),
                Err(e) => {
                    tracing::warn!(origin = %entry, error = %e, "Ignoring invalid development origin");
                    None
                }
            })
            .collect();
        Self { dev_origins }
    }

    /// Resolve the post-login target; never fails
    #[must_use]
    pub fn resolve(&self, desired: Option<&str>, caller_origin: Option<&str>) -> RedirectTarget {
        match self.check(desired, caller_origin) {
            Ok(url) => RedirectTarget::Absolute(url),
            Err(RedirectRejection::Missing) => RedirectTarget::Root,
            Err(reason) => {
                tracing::debug!(%reason, "Post-login target replaced with /");
                RedirectTarget::Root
            }
        }
    }

    /// Validate a requested target against the caller's origin and the allow-list
    ///
    /// # Errors
    ///
    /// Returns the reason the target cannot be used
    pub fn check(
        &self,
        desired: Option<&str>,
        caller_origin: Option<&str>,
    ) -> Result<Url, RedirectRejection> {
        let desired = desired
            .map(str::trim)
            .filter(|d| !d.is_empty() && *d != "/")
            .ok_or(RedirectRejection::Missing)?;

        let url = Url::parse(desired).map_err(|_| RedirectRejection::Unparseable)?;
        if url.host().is_none() {
            return Err(RedirectRejection::NoHost);
        }

        let target = url.origin();
        let caller = caller_origin
            .and_then(|o| Url::parse(o.trim()).ok())
            .map(|u| u.origin());

        if caller.as_ref() == Some(&target) || self.dev_origins.contains(&target) {
            Ok(url)
        } else {
            Err(RedirectRejection::ForeignOrigin)
        }
    }
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::new(&RedirectSettings::default())
    }
}
