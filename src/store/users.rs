//! Principal and invitation persistence.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use surrealdb::RecordId;
use tracing::{debug, warn};

use super::{BoxFuture, INVITATION_NOT_FOUND, StoreError, UserRepository, bounded, check_statements};
use crate::db::Db;
use crate::model::{Role, User, UserCredentials};
use crate::types::{TokenHash, UserId};

/// A principal about to be registered. Always created inactive.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub token_hash: TokenHash,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: UserId,
    username: String,
    email: String,
    password_hash: String,
    is_active: bool,
    role: Role,
    created_at: String,
}

impl UserRow {
    fn into_credentials(self) -> UserCredentials {
        UserCredentials {
            password_hash: self.password_hash,
            user: User {
                id: self.id,
                username: self.username,
                email: self.email,
                is_active: self.is_active,
                role: self.role,
                created_at: self.created_at,
            },
        }
    }
}

const USER_FIELDS: &str = r#"
    meta::id(id) AS id,
    username,
    email,
    password_hash,
    is_active,
    role.{ name, description, level } AS role,
    <string> created_at AS created_at
"#;

fn user_record(id: &UserId) -> RecordId {
    RecordId::from_table_key("user", id.as_str())
}

/// SurrealDB-backed [`UserRepository`].
pub struct UserStore {
    db: Db,
}

impl UserStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn fetch_row(&self, id: &UserId) -> Result<UserRow, StoreError> {
        let query = format!("SELECT {} FROM user WHERE id = $id LIMIT 1", USER_FIELDS);

        let mut res = bounded(self.db.query(query).bind(("id", user_record(id)))).await?;
        let rows: Vec<UserRow> = res.take(0)?;
        rows.into_iter().next().ok_or(StoreError::NotFound)
    }

    async fn insert_with_invitation(
        &self,
        user: &NewUser,
        invitation: &NewInvitation,
    ) -> Result<User, StoreError> {
        let query = r#"
            BEGIN TRANSACTION;
            CREATE $user CONTENT {
                username: $username,
                email: $email,
                password_hash: $password_hash,
                is_active: false,
                role: type::thing('role', $role)
            };
            CREATE invitation CONTENT {
                token_hash: $token_hash,
                principal: $user,
                expires_at: $expires_at
            };
            COMMIT TRANSACTION;
        "#;

        let mut res = bounded(
            self.db
                .query(query)
                .bind(("user", user_record(&user.id)))
                .bind(("username", user.username.clone()))
                .bind(("email", user.email.clone()))
                .bind(("password_hash", user.password_hash.clone()))
                .bind(("role", user.role.clone()))
                .bind(("token_hash", invitation.token_hash.as_str().to_string()))
                .bind((
                    "expires_at",
                    surrealdb::sql::Datetime::from(invitation.expires_at),
                )),
        )
        .await?;
        check_statements(&mut res)?;

        debug!(user_id = %user.id, "created pending user with invitation");
        match self.fetch_row(&user.id).await {
            Ok(row) => Ok(row.into_credentials().user),
            Err(e) => {
                // Committed but unreadable: undo so a failed create leaves nothing behind
                if let Err(cleanup) = self.remove(&user.id).await {
                    warn!(user_id = %user.id, error = %cleanup, "could not undo unreadable user");
                }
                Err(e)
            }
        }
    }

    async fn fetch_active_by_email(&self, email: &str) -> Result<UserCredentials, StoreError> {
        let query = format!(
            "SELECT {} FROM user WHERE email = $email AND is_active = true LIMIT 1",
            USER_FIELDS
        );

        let mut res = bounded(self.db.query(query).bind(("email", email.to_string()))).await?;
        let rows: Vec<UserRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(UserRow::into_credentials)
            .ok_or(StoreError::NotFound)
    }

    async fn consume_invitation(&self, token_hash: &TokenHash) -> Result<(), StoreError> {
        let query = format!(
            r#"
            BEGIN TRANSACTION;
            LET $invitation = (
                SELECT principal FROM invitation
                WHERE token_hash = $token_hash AND expires_at > time::now()
                LIMIT 1
            )[0];
            IF !$invitation {{ THROW "{}" }};
            LET $principal = $invitation.principal;
            UPDATE $principal SET is_active = true;
            DELETE invitation WHERE principal = $principal;
            COMMIT TRANSACTION;
            "#,
            INVITATION_NOT_FOUND
        );

        let mut res = bounded(
            self.db
                .query(query)
                .bind(("token_hash", token_hash.as_str().to_string())),
        )
        .await?;
        check_statements(&mut res)
    }

    async fn remove(&self, id: &UserId) -> Result<(), StoreError> {
        let query = r#"
            BEGIN TRANSACTION;
            DELETE invitation WHERE principal = $user;
            DELETE $user;
            COMMIT TRANSACTION;
        "#;

        let mut res = bounded(self.db.query(query).bind(("user", user_record(id)))).await?;
        check_statements(&mut res)
    }
}

impl UserRepository for UserStore {
    fn create_with_invitation<'a>(
        &'a self,
        user: &'a NewUser,
        invitation: &'a NewInvitation,
    ) -> BoxFuture<'a, Result<User, StoreError>> {
        Box::pin(self.insert_with_invitation(user, invitation))
    }

    fn get_by_id<'a>(&'a self, id: &'a UserId) -> BoxFuture<'a, Result<User, StoreError>> {
        Box::pin(async move { Ok(self.fetch_row(id).await?.into_credentials().user) })
    }

    fn get_credentials_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, Result<UserCredentials, StoreError>> {
        Box::pin(self.fetch_active_by_email(email))
    }

    fn activate<'a>(&'a self, token_hash: &'a TokenHash) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(self.consume_invitation(token_hash))
    }

    fn delete<'a>(&'a self, id: &'a UserId) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(self.remove(id))
    }
}
