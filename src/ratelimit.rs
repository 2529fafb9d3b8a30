//! Fixed-window admission control keyed by client address.
//!
//! Windows are aligned to the limiter's creation instant: window `n` spans
//! `[epoch + n*w, epoch + (n+1)*w)`. A client's counter belongs to the window
//! it was opened in and is worthless once that window ends, whether or not
//! the client comes back. Bursts of up to twice the limit across a boundary
//! are accepted.
//!
//! State is split over [`SHARD_COUNT`] independently locked maps. The common
//! denial path only takes a read lock; opening or bumping a counter takes the
//! write lock of one shard. Locks are never held across an `.await`.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

pub const SHARD_COUNT: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_window: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 20,
            window_seconds: 5,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds.max(1))
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Permitted,
    /// Denied until the current window ends.
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_permitted(&self) -> bool {
        matches!(self, Self::Permitted)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    index: u64,
    count: u32,
}

type Shard = RwLock<HashMap<String, Window>>;

pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    epoch: Instant,
    shards: Box<[Shard]>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            limit,
            window,
            epoch: Instant::now(),
            shards,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_window, config.window())
    }

    /// Index of the window containing `now`, and the instant it ends.
    fn locate(&self, now: Instant) -> (u64, Instant) {
        let window_nanos = self.window.as_nanos().max(1);
        let elapsed = now.saturating_duration_since(self.epoch).as_nanos();
        let index = (elapsed / window_nanos) as u64;
        let end_nanos = window_nanos.saturating_mul(index as u128 + 1);
        let end = self.epoch + Duration::from_nanos(end_nanos.min(u64::MAX as u128) as u64);
        (index, end)
    }

    fn shard(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Count one request from `key` against the current window.
    pub fn allow(&self, key: &str) -> Admission {
        let now = Instant::now();
        let (index, window_end) = self.locate(now);
        let denied = Admission::Denied {
            retry_after: window_end.saturating_duration_since(now),
        };
        let shard = self.shard(key);

        {
            let map = shard.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(w) = map.get(key)
                && w.index == index
                && w.count >= self.limit
            {
                return denied;
            }
        }

        let mut map = shard.write().unwrap_or_else(PoisonError::into_inner);
        let w = map
            .entry(key.to_string())
            .or_insert(Window { index, count: 0 });
        if w.index != index {
            *w = Window { index, count: 0 };
        }
        if w.count >= self.limit {
            return denied;
        }
        w.count += 1;
        Admission::Permitted
    }

    /// Drop every counter whose window has ended. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let (current, _) = self.locate(Instant::now());
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut map = shard.write().unwrap_or_else(PoisonError::into_inner);
            let before = map.len();
            map.retain(|_, w| w.index >= current);
            removed += before - map.len();
        }
        removed
    }

    /// Number of client keys currently holding a counter.
    pub fn tracked_clients(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Start the single background sweeper. It stops once the limiter is
    /// dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        let period = self.window;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let removed = limiter.sweep();
                if removed > 0 {
                    debug!(removed, "swept expired rate windows");
                }
            }
        })
    }
}
