//! CSRF state tokens binding the login leg to the callback leg

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Session key holding the pending [`StateToken`]
pub const STATE_SESSION_KEY: &str = "oauth_state";

/// One-time, unguessable OAuth2 `state` value
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateToken(String);

impl StateToken {
    /// Generate a new state token from 32 bytes of OS-seeded randomness
    #[must_use]
    pub fn generate() -> Self {
        let random_bytes: [u8; 32] = rand::rng().random();
        Self(hex::encode(random_bytes))
    }

    /// Token as sent to the provider
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact, case-sensitive comparison against a callback's `state` parameter
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let candidate = candidate.as_bytes();
        expected.len() == candidate.len()
            && expected
                .iter()
                .zip(candidate)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

// never print the nonce itself
impl std::fmt::Debug for StateToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StateToken").field(&"[redacted]").finish()
    }
}
