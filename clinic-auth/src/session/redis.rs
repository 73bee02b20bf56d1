//! Redis-backed session storage

use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::Pool as RedisPool;

use super::{SessionData, SessionError, SessionId, SessionStore};

const KEY_PREFIX: &str = "clinic:session:";

/// Session storage shared between server instances through Redis
///
/// Each session is stored as JSON with a TTL equal to its remaining
/// inactivity window, so Redis evicts abandoned sessions on its own.
#[derive(Clone)]
pub struct RedisSessionStore {
    pool: RedisPool,
}

impl std::fmt::Debug for RedisSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionStore")
            .field("pool", &"RedisPool")
            .finish()
    }
}

impl RedisSessionStore {
    /// Wrap an existing connection pool
    #[must_use]
    pub const fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Build a pool for `url` and wrap it
    ///
    /// # Errors
    ///
    /// Returns error if the URL cannot be turned into a pool
    pub fn from_url(url: &str) -> Result<Self, SessionError> {
        let pool = deadpool_redis::Config::from_url(url)
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| SessionError::Backend(e.to_string()))?;
        Ok(Self::new(pool))
    }

    fn key(id: &SessionId) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, SessionError> {
        self.pool
            .get()
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(Self::key(id))
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let data: SessionData = serde_json::from_str(&raw)?;
        if data.is_expired() {
            let _: () = conn
                .del(Self::key(id))
                .await
                .map_err(|e| SessionError::Backend(e.to_string()))?;
            return Ok(None);
        }

        Ok(Some(data))
    }

    async fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), SessionError> {
        let ttl = u64::try_from(data.remaining().num_seconds()).unwrap_or(0).max(1);
        let payload = serde_json::to_string(data)?;

        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(Self::key(id), payload, ttl)
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(Self::key(id))
            .await
            .map_err(|e| SessionError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_namespaced() {
        let id: SessionId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert_eq!(
            RedisSessionStore::key(&id),
            "clinic:session:550e8400-e29b-41d4-a716-446655440000"
        );
    }
}
