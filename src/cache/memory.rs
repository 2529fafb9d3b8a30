use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::{BoxFuture, CacheError, UserCache, decode, encode, user_key};
use crate::model::User;
use crate::types::UserId;

#[derive(Clone, Debug)]
struct CachedEntry {
    data: Arc<Vec<u8>>,
    expires_at: Instant,
}

impl CachedEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process snapshot cache.
///
/// Snapshots are stored encoded, the same as the Redis backend, so a hit
/// never aliases the caller's value. Expired entries are dropped lazily on
/// read and in bulk by [`MemoryUserCache::purge_expired`].
pub struct MemoryUserCache {
    entries: RwLock<HashMap<String, CachedEntry>>,
    ttl: Duration,
}

impl MemoryUserCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Purge once per TTL in the background until the cache is dropped.
    pub fn spawn_purger(self: &Arc<Self>) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.ttl.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.purge_expired().await;
                if removed > 0 {
                    debug!(removed, "purged expired principal snapshots");
                }
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn lookup(&self, id: &UserId) -> Result<Option<User>, CacheError> {
        let key = user_key(id);
        let now = Instant::now();

        let hit = {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if !entry.is_expired(now) => Some(Arc::clone(&entry.data)),
                Some(_) => None,
                None => return Ok(None),
            }
        };

        match hit {
            Some(data) => decode(&data).map(Some),
            None => {
                let mut entries = self.entries.write().await;
                if entries.get(&key).is_some_and(|e| e.is_expired(now)) {
                    entries.remove(&key);
                }
                Ok(None)
            }
        }
    }

    async fn store(&self, user: &User) -> Result<(), CacheError> {
        let entry = CachedEntry {
            data: Arc::new(encode(user)?),
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(user_key(&user.id), entry);
        Ok(())
    }
}

impl UserCache for MemoryUserCache {
    fn get<'a>(&'a self, id: &'a UserId) -> BoxFuture<'a, Result<Option<User>, CacheError>> {
        Box::pin(self.lookup(id))
    }

    fn set<'a>(&'a self, user: &'a User) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(self.store(user))
    }
}
