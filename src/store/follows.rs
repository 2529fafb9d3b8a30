use surrealdb::RecordId;

use super::{StoreError, bounded, check_statements};
use crate::db::Db;
use crate::types::UserId;

fn user_record(id: &UserId) -> RecordId {
    RecordId::from_table_key("user", id.as_str())
}

/// Directed follow edges between users.
pub struct FollowStore {
    db: Db,
}

impl FollowStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// `follower` starts following `followee`. Following twice is a conflict.
    pub async fn follow(&self, follower: &UserId, followee: &UserId) -> Result<(), StoreError> {
        let query = "CREATE follower CONTENT { followee: $followee, follower: $follower } RETURN NONE";

        let mut res = bounded(
            self.db
                .query(query)
                .bind(("followee", user_record(followee)))
                .bind(("follower", user_record(follower))),
        )
        .await?;
        check_statements(&mut res)
    }

    /// Removing an edge that does not exist is not an error.
    pub async fn unfollow(&self, follower: &UserId, followee: &UserId) -> Result<(), StoreError> {
        let query = "DELETE follower WHERE followee = $followee AND follower = $follower";

        let mut res = bounded(
            self.db
                .query(query)
                .bind(("followee", user_record(followee)))
                .bind(("follower", user_record(follower))),
        )
        .await?;
        check_statements(&mut res)
    }

    pub async fn is_following(
        &self,
        follower: &UserId,
        followee: &UserId,
    ) -> Result<bool, StoreError> {
        let query = "SELECT VALUE id FROM follower WHERE followee = $followee AND follower = $follower LIMIT 1";

        let mut res = bounded(
            self.db
                .query(query)
                .bind(("followee", user_record(followee)))
                .bind(("follower", user_record(follower))),
        )
        .await?;
        let ids: Vec<RecordId> = res.take(0)?;
        Ok(!ids.is_empty())
    }
}
