use serde::Serialize;
use surrealdb::RecordId;

use super::{PaginatedQuery, StoreError, bounded, check_statements};
use crate::db::Db;
use crate::model::{FeedItem, Post};
use crate::types::{PostId, UserId};

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

const POST_FIELDS: &str = r#"
    meta::id(id) AS id,
    title,
    content,
    meta::id(owner) AS user_id,
    tags,
    <string> created_at AS created_at,
    <string> updated_at AS updated_at
"#;

fn post_record(id: &PostId) -> RecordId {
    RecordId::from_table_key("post", id.as_str())
}

fn user_record(id: &UserId) -> RecordId {
    RecordId::from_table_key("user", id.as_str())
}

pub struct PostStore {
    db: Db,
}

impl PostStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create(&self, owner: &UserId, post: NewPost) -> Result<Post, StoreError> {
        let id = PostId::generate();
        let query = r#"
            CREATE $post CONTENT {
                title: $title,
                content: $content,
                owner: $owner,
                tags: $tags
            } RETURN NONE
        "#;

        let mut res = bounded(
            self.db
                .query(query)
                .bind(("post", post_record(&id)))
                .bind(("title", post.title))
                .bind(("content", post.content))
                .bind(("owner", user_record(owner)))
                .bind(("tags", post.tags)),
        )
        .await?;
        check_statements(&mut res)?;

        self.get_by_id(&id).await
    }

    /// Fetch a post without its comments.
    pub async fn get_by_id(&self, id: &PostId) -> Result<Post, StoreError> {
        let query = format!("SELECT {} FROM post WHERE id = $post LIMIT 1", POST_FIELDS);

        let mut res = bounded(self.db.query(query).bind(("post", post_record(id)))).await?;
        let posts: Vec<Post> = res.take(0)?;
        posts.into_iter().next().ok_or(StoreError::NotFound)
    }

    pub async fn update(&self, id: &PostId, patch: PostPatch) -> Result<Post, StoreError> {
        let mut res = bounded(
            self.db
                .query("UPDATE $post MERGE $patch RETURN NONE")
                .bind(("post", post_record(id)))
                .bind(("patch", patch)),
        )
        .await?;
        check_statements(&mut res)?;

        self.get_by_id(id).await
    }

    /// Delete a post and its comments.
    pub async fn delete(&self, id: &PostId) -> Result<(), StoreError> {
        // Existence check keeps a second delete a 404
        self.get_by_id(id).await?;

        let query = r#"
            BEGIN TRANSACTION;
            DELETE comment WHERE post = $post;
            DELETE $post;
            COMMIT TRANSACTION;
        "#;

        let mut res = bounded(self.db.query(query).bind(("post", post_record(id)))).await?;
        check_statements(&mut res)
    }

    /// Posts by `user` and by everyone `user` follows.
    pub async fn feed(
        &self,
        user: &UserId,
        page: PaginatedQuery,
    ) -> Result<Vec<FeedItem>, StoreError> {
        let query = format!(
            r#"
            SELECT
                {},
                owner.username AS username,
                array::len((SELECT VALUE id FROM comment WHERE post = $parent.id)) AS comment_count,
                created_at AS created_ts
            FROM post
            WHERE owner = $user
               OR owner IN (SELECT VALUE followee FROM follower WHERE follower = $user)
            ORDER BY created_ts {}
            LIMIT $limit START $offset
            "#,
            POST_FIELDS,
            page.sort.as_sql()
        );

        let mut res = bounded(
            self.db
                .query(query)
                .bind(("user", user_record(user)))
                .bind(("limit", page.limit))
                .bind(("offset", page.offset)),
        )
        .await?;
        Ok(res.take(0)?)
    }
}
