use surrealdb::RecordId;

use super::{StoreError, bounded, check_statements};
use crate::db::Db;
use crate::model::Comment;
use crate::types::{CommentId, PostId, UserId};

const COMMENT_FIELDS: &str = r#"
    meta::id(id) AS id,
    meta::id(post) AS post_id,
    meta::id(author) AS user_id,
    content,
    <string> created_at AS created_at,
    { id: meta::id(author), username: author.username } AS user
"#;

pub struct CommentStore {
    db: Db,
}

impl CommentStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        post: &PostId,
        author: &UserId,
        content: String,
    ) -> Result<Comment, StoreError> {
        let id = CommentId::generate();
        let query = r#"
            CREATE $comment CONTENT {
                post: $post,
                author: $author,
                content: $content
            } RETURN NONE
        "#;

        let mut res = bounded(
            self.db
                .query(query)
                .bind(("comment", RecordId::from_table_key("comment", id.as_str())))
                .bind(("post", RecordId::from_table_key("post", post.as_str())))
                .bind(("author", RecordId::from_table_key("user", author.as_str())))
                .bind(("content", content)),
        )
        .await?;
        check_statements(&mut res)?;

        let query = format!("SELECT {} FROM comment WHERE id = $comment LIMIT 1", COMMENT_FIELDS);
        let mut res = bounded(
            self.db
                .query(query)
                .bind(("comment", RecordId::from_table_key("comment", id.as_str()))),
        )
        .await?;
        let comments: Vec<Comment> = res.take(0)?;
        comments.into_iter().next().ok_or(StoreError::NotFound)
    }

    /// Comments on a post, newest first.
    pub async fn list_by_post(&self, post: &PostId) -> Result<Vec<Comment>, StoreError> {
        let query = format!(
            "SELECT {} FROM comment WHERE post = $post ORDER BY created_at DESC",
            COMMENT_FIELDS
        );

        let mut res = bounded(
            self.db
                .query(query)
                .bind(("post", RecordId::from_table_key("post", post.as_str()))),
        )
        .await?;
        Ok(res.take(0)?)
    }
}
