use serde::{Deserialize, Serialize};

use crate::types::{CommentId, PostId, UserId};

pub const ROLE_USER: &str = "user";
pub const ROLE_MODERATOR: &str = "moderator";
pub const ROLE_ADMIN: &str = "admin";

/// Named privilege level. Higher `level` implies every lower privilege.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub level: i64,
}

impl Role {
    /// Whether this role grants at least the privileges of `required`.
    pub fn satisfies(&self, required: &Role) -> bool {
        self.level >= required.level
    }
}

/// Reference roles written by `ensure_schema`.
pub fn seed_roles() -> Vec<Role> {
    vec![
        Role {
            name: ROLE_USER.to_string(),
            description: "A user can create posts and comments".to_string(),
            level: 1,
        },
        Role {
            name: ROLE_MODERATOR.to_string(),
            description: "A moderator can update other users posts".to_string(),
            level: 2,
        },
        Role {
            name: ROLE_ADMIN.to_string(),
            description: "An admin can update and delete other users posts".to_string(),
            level: 3,
        },
    ]
}

/// Principal snapshot. This is what the cache stores and what handlers
/// receive once a request is authenticated.
///
/// The credential hash is deliberately absent; see [`UserCredentials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub role: Role,
    pub created_at: String,
}

/// A user together with the stored password hash, used only by the
/// credential issuer.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub user_id: UserId,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub user_id: UserId,
    pub content: String,
    pub created_at: String,
    pub user: CommentAuthor,
}

/// A post as it appears in a feed: author name and comment count attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub user_id: UserId,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub username: String,
    pub comment_count: i64,
}
