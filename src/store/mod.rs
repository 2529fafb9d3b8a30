//! Durable storage on top of SurrealDB.
//!
//! Every call goes through [`bounded`], which caps it at [`QUERY_TIMEOUT`].
//! Multi-statement units run inside `BEGIN/COMMIT TRANSACTION` so that a
//! failing statement rolls the whole unit back.

mod comments;
mod follows;
mod pagination;
mod posts;
mod roles;
mod users;

pub use comments::CommentStore;
pub use follows::FollowStore;
pub use pagination::{MAX_PAGE_LIMIT, PageParams, PaginatedQuery, PaginationError, SortOrder};
pub use posts::{NewPost, PostPatch, PostStore};
pub use roles::RoleStore;
pub use users::{NewInvitation, NewUser, UserStore};

use std::collections::HashMap;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::db::Db;
use crate::db::schema::{FOLLOW_PAIR_INDEX, USER_EMAIL_INDEX, USER_USERNAME_INDEX};
use crate::model::{User, UserCredentials};
use crate::types::{TokenHash, UserId};

/// Deadline applied to every durable-store call.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Marker thrown from inside the activation transaction on a miss.
pub(crate) const INVITATION_NOT_FOUND: &str = "invitation_not_found";

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No matching record (or an expired/consumed invitation)
    NotFound,
    /// Unique email index violated
    DuplicateEmail,
    /// Unique username index violated
    DuplicateUsername,
    /// Some other uniqueness constraint was violated
    Conflict(String),
    /// The call did not finish within `QUERY_TIMEOUT`
    Timeout,
    /// Any other engine or decoding failure
    Database(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Record not found"),
            Self::DuplicateEmail => write!(f, "A user with that email already exists"),
            Self::DuplicateUsername => write!(f, "A user with that username already exists"),
            Self::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Self::Timeout => write!(f, "Database call timed out after {:?}", QUERY_TIMEOUT),
            Self::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<surrealdb::Error> for StoreError {
    fn from(e: surrealdb::Error) -> Self {
        classify_messages(&[e.to_string()])
    }
}

/// Map engine error text onto the store taxonomy.
fn classify_messages(messages: &[String]) -> StoreError {
    let mentions = |needle: &str| messages.iter().any(|m| m.contains(needle));

    if mentions(USER_EMAIL_INDEX) {
        StoreError::DuplicateEmail
    } else if mentions(USER_USERNAME_INDEX) {
        StoreError::DuplicateUsername
    } else if mentions(FOLLOW_PAIR_INDEX) {
        StoreError::Conflict("already following".to_string())
    } else if mentions(INVITATION_NOT_FOUND) {
        StoreError::NotFound
    } else {
        StoreError::Database(messages.join("; "))
    }
}

/// Run a query under the store deadline.
pub(crate) async fn bounded<F, T>(query: F) -> Result<T, StoreError>
where
    F: IntoFuture<Output = surrealdb::Result<T>>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, query).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout),
    }
}

/// Surface per-statement failures of a multi-statement response.
///
/// Inside a transaction one failing statement cancels the others, so all
/// messages are inspected rather than just the first.
pub(crate) fn check_statements(response: &mut surrealdb::Response) -> Result<(), StoreError> {
    let errors: HashMap<usize, surrealdb::Error> = response.take_errors();
    if errors.is_empty() {
        return Ok(());
    }

    let mut indexed: Vec<(usize, String)> = errors
        .into_iter()
        .map(|(idx, e)| (idx, e.to_string()))
        .collect();
    indexed.sort_by_key(|(idx, _)| *idx);
    let messages: Vec<String> = indexed.into_iter().map(|(_, m)| m).collect();

    Err(classify_messages(&messages))
}

/// Principal persistence: the seam the workflows and the resolver depend on.
pub trait UserRepository: Send + Sync {
    /// Insert a pending principal and its invitation as one atomic unit.
    fn create_with_invitation<'a>(
        &'a self,
        user: &'a NewUser,
        invitation: &'a NewInvitation,
    ) -> BoxFuture<'a, Result<User, StoreError>>;

    fn get_by_id<'a>(&'a self, id: &'a UserId) -> BoxFuture<'a, Result<User, StoreError>>;

    /// Active principals only.
    fn get_credentials_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, Result<UserCredentials, StoreError>>;

    /// Consume a live invitation and flip its principal to active.
    fn activate<'a>(&'a self, token_hash: &'a TokenHash) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Remove a principal together with any outstanding invitation.
    fn delete<'a>(&'a self, id: &'a UserId) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// All stores sharing one connection.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub roles: Arc<RoleStore>,
    pub posts: Arc<PostStore>,
    pub comments: Arc<CommentStore>,
    pub follows: Arc<FollowStore>,
}

impl Storage {
    pub fn new(db: Db) -> Self {
        Self {
            users: Arc::new(UserStore::new(db.clone())),
            roles: Arc::new(RoleStore::new(db.clone())),
            posts: Arc::new(PostStore::new(db.clone())),
            comments: Arc::new(CommentStore::new(db.clone())),
            follows: Arc::new(FollowStore::new(db)),
        }
    }
}
