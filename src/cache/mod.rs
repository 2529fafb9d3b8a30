//! Principal snapshot cache.
//!
//! The cache is a collaborator of the principal resolver: a miss or a
//! transport failure sends the resolver to the durable store, so no
//! implementation here has to be reliable, only fast.

mod memory;
mod redis_cache;

pub use memory::MemoryUserCache;
pub use redis_cache::RedisUserCache;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::model::User;
use crate::store::BoxFuture;
use crate::types::UserId;

pub const DEFAULT_USER_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackend,
    /// Only read when `backend` is `redis`
    pub redis_url: String,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            ttl_seconds: DEFAULT_USER_TTL_SECONDS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The backend could not be reached or rejected the command
    Transport(String),
    /// A stored snapshot could not be encoded or decoded
    Codec(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "Cache transport error: {}", msg),
            Self::Codec(msg) => write!(f, "Cache codec error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

/// Key-value store of principal snapshots with per-entry expiry.
pub trait UserCache: Send + Sync {
    /// `Ok(None)` is a miss; errors are distinct from absence.
    fn get<'a>(&'a self, id: &'a UserId) -> BoxFuture<'a, Result<Option<User>, CacheError>>;

    /// Store a snapshot for the configured TTL.
    fn set<'a>(&'a self, user: &'a User) -> BoxFuture<'a, Result<(), CacheError>>;
}

/// Cache key for a principal snapshot.
pub fn user_key(id: &UserId) -> String {
    format!("user-{}", id)
}

pub(crate) fn encode(user: &User) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(user).map_err(|e| CacheError::Codec(e.to_string()))
}

pub(crate) fn decode(bytes: &[u8]) -> Result<User, CacheError> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Codec(e.to_string()))
}

/// Build the configured cache, or `None` when caching is disabled.
///
/// The in-process backend gets its purge task here, so this must run inside
/// a tokio runtime.
pub fn build_cache(config: &CacheConfig) -> anyhow::Result<Option<Arc<dyn UserCache>>> {
    if !config.enabled {
        return Ok(None);
    }

    let cache: Arc<dyn UserCache> = match config.backend {
        CacheBackend::Memory => {
            let memory = Arc::new(MemoryUserCache::new(config.ttl()));
            memory.spawn_purger();
            memory
        }
        CacheBackend::Redis => Arc::new(RedisUserCache::connect(&config.redis_url, config.ttl())?),
    };
    Ok(Some(cache))
}
