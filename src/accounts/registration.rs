//! Registration saga.
//!
//! hash password → issue token → persist principal and invitation → deliver
//! confirmation. Only persisting has something to undo: when delivery fails
//! the principal is deleted again, taking its invitation with it.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::RngCore;
use serde_json::json;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{AccountError, RegistrationRequest};
use crate::auth::password::hash_password;
use crate::mailer::{INVITATION_TEMPLATE, MailConfig, Mailer, Recipient, RetryPolicy, TemplateData, send_with_retry};
use crate::model::{ROLE_USER, User};
use crate::saga::{Saga, SagaStep};
use crate::store::{BoxFuture, NewInvitation, NewUser, StoreError, UserRepository};
use crate::types::{TokenHash, UserId};

const TOKEN_BYTES: usize = 32;

/// State threaded through the registration steps.
pub struct RegistrationContext {
    pub username: String,
    pub email: String,
    password: String,
    password_hash: Option<String>,
    /// Plaintext one-time token; only its hash is persisted
    pub token: Option<String>,
    pub user: Option<User>,
}

impl RegistrationContext {
    pub fn new(request: RegistrationRequest) -> Self {
        Self {
            username: request.username,
            email: request.email,
            password: request.password,
            password_hash: None,
            token: None,
            user: None,
        }
    }
}

pub fn registration_saga(
    users: Arc<dyn UserRepository>,
    mailer: Arc<dyn Mailer>,
    mail: &MailConfig,
) -> Saga<RegistrationContext, AccountError> {
    Saga::new("registration")
        .step(HashPassword)
        .step(IssueToken)
        .step(PersistUser {
            users,
            invitation_ttl: mail.invitation_ttl(),
        })
        .step(SendConfirmation {
            mailer,
            policy: mail.retry_policy(),
            frontend_url: mail.frontend_url.clone(),
            app_name: mail.from_name.clone(),
        })
}

/// 32 random bytes, URL-safe base64 without padding.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `{frontend_url}/confirm/{token}`, keeping any base path of the frontend.
pub fn activation_url(frontend_url: &str, token: &str) -> Result<Url, AccountError> {
    let mut url = Url::parse(frontend_url)
        .map_err(|e| AccountError::Internal(format!("invalid frontend URL {:?}: {}", frontend_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| AccountError::Internal(format!("frontend URL {:?} cannot be a base", frontend_url)))?
        .pop_if_empty()
        .push("confirm")
        .push(token);
    Ok(url)
}

struct HashPassword;

impl SagaStep<RegistrationContext, AccountError> for HashPassword {
    fn name(&self) -> &'static str {
        "hash_password"
    }

    fn execute<'a>(&'a self, ctx: &'a mut RegistrationContext) -> BoxFuture<'a, Result<(), AccountError>> {
        Box::pin(async move {
            let password = std::mem::take(&mut ctx.password);
            let hash = tokio::task::spawn_blocking(move || hash_password(&password))
                .await
                .map_err(|e| AccountError::Internal(e.to_string()))?
                .map_err(|e| AccountError::Internal(format!("password hashing failed: {}", e)))?;
            ctx.password_hash = Some(hash);
            Ok(())
        })
    }

    fn compensate<'a>(&'a self, _ctx: &'a mut RegistrationContext) -> BoxFuture<'a, Result<(), AccountError>> {
        Box::pin(async { Ok(()) })
    }
}

struct IssueToken;

impl SagaStep<RegistrationContext, AccountError> for IssueToken {
    fn name(&self) -> &'static str {
        "issue_token"
    }

    fn execute<'a>(&'a self, ctx: &'a mut RegistrationContext) -> BoxFuture<'a, Result<(), AccountError>> {
        Box::pin(async move {
            ctx.token = Some(generate_token());
            Ok(())
        })
    }

    fn compensate<'a>(&'a self, ctx: &'a mut RegistrationContext) -> BoxFuture<'a, Result<(), AccountError>> {
        Box::pin(async move {
            ctx.token = None;
            Ok(())
        })
    }
}

struct PersistUser {
    users: Arc<dyn UserRepository>,
    invitation_ttl: chrono::Duration,
}

impl SagaStep<RegistrationContext, AccountError> for PersistUser {
    fn name(&self) -> &'static str {
        "persist_user"
    }

    fn execute<'a>(&'a self, ctx: &'a mut RegistrationContext) -> BoxFuture<'a, Result<(), AccountError>> {
        Box::pin(async move {
            let (Some(password_hash), Some(token)) = (ctx.password_hash.clone(), ctx.token.as_deref()) else {
                return Err(AccountError::Internal("credentials not prepared".to_string()));
            };

            let new_user = NewUser {
                id: UserId::generate(),
                username: ctx.username.clone(),
                email: ctx.email.clone(),
                password_hash,
                role: ROLE_USER.to_string(),
            };
            let invitation = NewInvitation {
                token_hash: TokenHash::of(token),
                expires_at: Utc::now() + self.invitation_ttl,
            };

            let user = match self.users.create_with_invitation(&new_user, &invitation).await {
                Ok(user) => user,
                Err(e @ (StoreError::DuplicateEmail | StoreError::DuplicateUsername)) => return Err(e.into()),
                Err(e) => {
                    // The transaction may have committed before the failure surfaced
                    if let Err(cleanup) = self.users.delete(&new_user.id).await {
                        error!(user_id = %new_user.id, error = %cleanup, "could not remove possibly persisted user");
                    }
                    return Err(e.into());
                }
            };
            debug!(user_id = %user.id, expires_at = %invitation.expires_at, "stored pending user");
            ctx.user = Some(user);
            Ok(())
        })
    }

    fn compensate<'a>(&'a self, ctx: &'a mut RegistrationContext) -> BoxFuture<'a, Result<(), AccountError>> {
        Box::pin(async move {
            let Some(user) = ctx.user.take() else {
                return Ok(());
            };
            if let Err(e) = self.users.delete(&user.id).await {
                // Keep the user so the caller can still see who was left behind
                ctx.user = Some(user);
                return Err(e.into());
            }
            info!(user_id = %user.id, "removed user after failed registration");
            Ok(())
        })
    }
}

struct SendConfirmation {
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
    frontend_url: String,
    app_name: String,
}

impl SagaStep<RegistrationContext, AccountError> for SendConfirmation {
    fn name(&self) -> &'static str {
        "send_confirmation"
    }

    fn execute<'a>(&'a self, ctx: &'a mut RegistrationContext) -> BoxFuture<'a, Result<(), AccountError>> {
        Box::pin(async move {
            let Some(token) = ctx.token.as_deref() else {
                return Err(AccountError::Internal("no token to deliver".to_string()));
            };
            let url = activation_url(&self.frontend_url, token)?;

            let recipient = Recipient {
                name: ctx.username.clone(),
                email: ctx.email.clone(),
            };
            let mut data = TemplateData::new();
            data.insert("username".to_string(), json!(ctx.username));
            data.insert("app".to_string(), json!(self.app_name));
            data.insert("activation_url".to_string(), json!(url.as_str()));

            if let Err(e) = send_with_retry(
                self.mailer.as_ref(),
                self.policy,
                INVITATION_TEMPLATE,
                &recipient,
                &data,
            )
            .await
            {
                warn!(email = %ctx.email, error = %e, "confirmation delivery failed");
                return Err(e.into());
            }
            Ok(())
        })
    }

    fn compensate<'a>(&'a self, _ctx: &'a mut RegistrationContext) -> BoxFuture<'a, Result<(), AccountError>> {
        Box::pin(async { Ok(()) })
    }
}
