use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::UserCache;
use crate::model::User;
use crate::store::{StoreError, UserRepository};
use crate::types::UserId;

/// Read-through principal lookup: cache first, store on miss.
///
/// Snapshots may be stale by up to one cache TTL; nothing invalidates them.
pub struct PrincipalResolver {
    users: Arc<dyn UserRepository>,
    cache: Option<Arc<dyn UserCache>>,
}

impl PrincipalResolver {
    pub fn new(users: Arc<dyn UserRepository>, cache: Option<Arc<dyn UserCache>>) -> Self {
        Self { users, cache }
    }

    pub async fn resolve(&self, id: &UserId) -> Result<User, StoreError> {
        let Some(cache) = &self.cache else {
            return self.users.get_by_id(id).await;
        };

        match cache.get(id).await {
            Ok(Some(user)) => {
                debug!(user_id = %id, "principal cache hit");
                return Ok(user);
            }
            Ok(None) => debug!(user_id = %id, "principal cache miss"),
            Err(e) => warn!(user_id = %id, error = %e, "principal cache read failed, using store"),
        }

        let user = self.users.get_by_id(id).await?;

        if let Err(e) = cache.set(&user).await {
            warn!(user_id = %id, error = %e, "failed to populate principal cache");
        }

        Ok(user)
    }
}
