use std::time::Duration;

use deadpool_redis::{Pool, Runtime};
use redis::AsyncCommands;
use tracing::debug;

use super::{BoxFuture, CacheError, UserCache, decode, encode, user_key};
use crate::model::User;
use crate::types::UserId;

/// Snapshot cache in Redis: `SETEX user-{id}` with a JSON body.
pub struct RedisUserCache {
    pool: Pool,
    ttl: Duration,
}

impl RedisUserCache {
    pub fn new(pool: Pool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    /// Build a pool for `url`. No connection is made until first use.
    pub fn connect(url: &str, ttl: Duration) -> anyhow::Result<Self> {
        let pool = deadpool_redis::Config::from_url(url).create_pool(Some(Runtime::Tokio1))?;
        Ok(Self::new(pool, ttl))
    }

    async fn fetch(&self, id: &UserId) -> Result<Option<User>, CacheError> {
        let key = user_key(id);
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        let data: Option<Vec<u8>> = conn
            .get(&key)
            .await
            .map_err(|e: redis::RedisError| CacheError::Transport(e.to_string()))?;

        match data {
            Some(bytes) => {
                debug!(key = %key, "cache hit");
                decode(&bytes).map(Some)
            }
            None => {
                debug!(key = %key, "cache miss");
                Ok(None)
            }
        }
    }

    async fn store(&self, user: &User) -> Result<(), CacheError> {
        let key = user_key(&user.id);
        let data = encode(user)?;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        conn.set_ex::<_, _, ()>(&key, data, self.ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))
    }
}

impl UserCache for RedisUserCache {
    fn get<'a>(&'a self, id: &'a UserId) -> BoxFuture<'a, Result<Option<User>, CacheError>> {
        Box::pin(self.fetch(id))
    }

    fn set<'a>(&'a self, user: &'a User) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(self.store(user))
    }
}
