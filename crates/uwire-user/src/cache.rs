//! Ephemeral key-value cache: trait, Redis backend, and typed key helpers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;
use uuid::Uuid;

use crate::entities::User;
use crate::error::UserError;

/// String cache with per-entry TTL.
///
/// The cache is eventually consistent and best-effort; callers decide which
/// failures are fatal.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, UserError>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), UserError>;
    async fn delete(&self, key: &str) -> Result<(), UserError>;
}

// ── Cache key layout ──────────────────────────────────────────────

pub fn otp_key(email: &str) -> String {
    format!("otp:{email}")
}

pub fn pending_user_key(email: &str) -> String {
    format!("user:{email}")
}

pub fn token_key(token: &str) -> String {
    format!("token:{token}")
}

pub fn profile_key(user_id: Uuid) -> String {
    format!("profile:{user_id}")
}

// ── Redis backend ─────────────────────────────────────────────────

/// Redis-backed cache using a multiplexed connection manager.
#[derive(Clone)]
pub struct RedisCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisCache {
    /// Connect and verify the server responds to PING.
    pub async fn connect(url: &str) -> Result<Self, UserError> {
        let client = redis::Client::open(url)
            .map_err(|e| UserError::upstream("redis error", e))?;
        let mut manager = client
            .get_connection_manager()
            .await
            .map_err(|e| UserError::upstream("redis error", e))?;
        redis::cmd("PING")
            .query_async::<()>(&mut manager)
            .await
            .map_err(|e| UserError::upstream("redis error", e))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, UserError> {
        let mut conn = self.manager.clone();
        conn.get(key)
            .await
            .map_err(|e| UserError::upstream("redis error", e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), UserError> {
        let mut conn = self.manager.clone();
        conn.set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| UserError::upstream("redis error", e))
    }

    async fn delete(&self, key: &str) -> Result<(), UserError> {
        let mut conn = self.manager.clone();
        conn.del(key)
            .await
            .map_err(|e| UserError::upstream("redis error", e))
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

// ── Disabled mode ─────────────────────────────────────────────────

/// No-op cache used when the cache server is unreachable at startup; every
/// read misses and every write succeeds silently.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCache;

#[async_trait]
impl Cache for DisabledCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, UserError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), UserError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), UserError> {
        Ok(())
    }
}

// ── Typed access ──────────────────────────────────────────────────

/// Typed view over the shared cache with the service's TTL policy.
#[derive(Clone)]
pub struct UserCache {
    cache: Arc<dyn Cache>,
    otp_ttl: Duration,
    pending_user_ttl: Duration,
    token_ttl: Duration,
    profile_ttl: Duration,
}

impl UserCache {
    pub fn new(
        cache: Arc<dyn Cache>,
        otp_ttl: Duration,
        pending_user_ttl: Duration,
        token_ttl: Duration,
        profile_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            otp_ttl,
            pending_user_ttl,
            token_ttl,
            profile_ttl,
        }
    }

    pub async fn get_otp(&self, email: &str) -> Result<Option<String>, UserError> {
        self.cache.get(&otp_key(email)).await
    }

    pub async fn set_otp(&self, email: &str, otp: &str) -> Result<(), UserError> {
        self.cache.set(&otp_key(email), otp, self.otp_ttl).await
    }

    pub async fn delete_otp(&self, email: &str) -> Result<(), UserError> {
        self.cache.delete(&otp_key(email)).await
    }

    pub async fn set_pending_user(&self, user: &User) -> Result<(), UserError> {
        let json = serde_json::to_string(user).map_err(UserError::internal)?;
        self.cache
            .set(&pending_user_key(&user.email), &json, self.pending_user_ttl)
            .await
    }

    pub async fn get_pending_user(&self, email: &str) -> Result<Option<User>, UserError> {
        match self.cache.get(&pending_user_key(email)).await? {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).map_err(UserError::internal)?,
            )),
            None => Ok(None),
        }
    }

    pub async fn delete_pending_user(&self, email: &str) -> Result<(), UserError> {
        self.cache.delete(&pending_user_key(email)).await
    }

    pub async fn set_token(&self, token: &str, user_id: Uuid) -> Result<(), UserError> {
        self.cache
            .set(&token_key(token), &user_id.to_string(), self.token_ttl)
            .await
    }

    pub async fn get_token(&self, token: &str) -> Result<Option<String>, UserError> {
        self.cache.get(&token_key(token)).await
    }

    pub async fn set_profile(&self, user: &User) -> Result<(), UserError> {
        let json = serde_json::to_string(user).map_err(UserError::internal)?;
        self.cache
            .set(&profile_key(user.id), &json, self.profile_ttl)
            .await
    }

    pub async fn get_profile(&self, user_id: Uuid) -> Result<Option<User>, UserError> {
        match self.cache.get(&profile_key(user_id)).await? {
            Some(json) => match serde_json::from_str(&json) {
                Ok(user) => Ok(Some(user)),
                Err(err) => {
                    // A malformed snapshot is treated as a miss, not a failure.
                    warn!(error = %err, "discarding undecodable profile snapshot");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for UserCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCache")
            .field("otp_ttl", &self.otp_ttl)
            .field("pending_user_ttl", &self.pending_user_ttl)
            .field("token_ttl", &self.token_ttl)
            .field("profile_ttl", &self.profile_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_wire_contract() {
        let id = Uuid::nil();
        assert_eq!(otp_key("a@x"), "otp:a@x");
        assert_eq!(pending_user_key("a@x"), "user:a@x");
        assert_eq!(token_key("tok"), "token:tok");
        assert_eq!(
            profile_key(id),
            "profile:00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn disabled_cache_misses_and_swallows_writes() {
        let cache = DisabledCache;
        cache.set("k", "v", Duration::from_secs(1)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        cache.delete("k").await.unwrap();
    }
}
