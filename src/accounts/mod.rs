//! Account lifecycle: registration and activation.
//!
//! Both workflows run on a detached task. The calling request awaits the
//! outcome, but dropping that request does not stop the workflow halfway
//! between creating a principal and compensating it.

mod activation;
mod registration;

pub use activation::activate_invitation;
pub use registration::{RegistrationContext, registration_saga};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::mailer::{MailConfig, MailError, Mailer};
use crate::model::User;
use crate::saga::Saga;
use crate::store::{StoreError, UserRepository};

pub const USERNAME_MIN_CHARS: usize = 3;
pub const USERNAME_MAX_CHARS: usize = 255;
pub const EMAIL_MAX_CHARS: usize = 255;
pub const PASSWORD_MIN_CHARS: usize = 8;
pub const PASSWORD_MAX_CHARS: usize = 72;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// The request payload failed validation
    Validation(String),
    /// Durable store failure, including duplicate identity and token misses
    Store(StoreError),
    /// The confirmation message could not be delivered
    Delivery(MailError),
    Internal(String),
}

impl fmt::Display for AccountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Validation failed: {}", msg),
            Self::Store(e) => write!(f, "{}", e),
            Self::Delivery(e) => write!(f, "Confirmation not delivered: {}", e),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AccountError {}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<MailError> for AccountError {
    fn from(e: MailError) -> Self {
        Self::Delivery(e)
    }
}

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrationRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl RegistrationRequest {
    pub fn validate(&self) -> Result<(), AccountError> {
        let username = self.username.chars().count();
        if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&username) {
            return Err(AccountError::Validation(format!(
                "username must be between {} and {} characters",
                USERNAME_MIN_CHARS, USERNAME_MAX_CHARS
            )));
        }

        if self.email.chars().count() > EMAIL_MAX_CHARS || !is_valid_email(&self.email) {
            return Err(AccountError::Validation("email is not valid".to_string()));
        }

        let password = self.password.chars().count();
        if !(PASSWORD_MIN_CHARS..=PASSWORD_MAX_CHARS).contains(&password) {
            return Err(AccountError::Validation(format!(
                "password must be between {} and {} characters",
                PASSWORD_MIN_CHARS, PASSWORD_MAX_CHARS
            )));
        }

        Ok(())
    }
}

/// `local@domain.tld`, no whitespace, exactly one `@`.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty() && !domain.starts_with('.'),
        None => false,
    }
}

/// A freshly registered, still pending principal and its one-time token.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
}

pub struct Accounts {
    users: Arc<dyn UserRepository>,
    registration: Saga<RegistrationContext, AccountError>,
}

impl Accounts {
    pub fn new(users: Arc<dyn UserRepository>, mailer: Arc<dyn Mailer>, mail: &MailConfig) -> Self {
        Self {
            registration: registration_saga(users.clone(), mailer, mail),
            users,
        }
    }

    pub async fn register(self: &Arc<Self>, request: RegistrationRequest) -> Result<Registration, AccountError> {
        request.validate()?;

        let accounts = Arc::clone(self);
        tokio::spawn(async move { accounts.run_registration(request).await })
            .await
            .map_err(|e| AccountError::Internal(format!("registration task failed: {}", e)))?
    }

    async fn run_registration(&self, request: RegistrationRequest) -> Result<Registration, AccountError> {
        let mut ctx = RegistrationContext::new(request);

        if let Err(failure) = self.registration.run(&mut ctx).await {
            if !failure.compensated {
                error!(
                    email = %ctx.email,
                    step = failure.step,
                    "registration failed and was not fully compensated"
                );
            }
            return Err(failure.error);
        }

        let (Some(user), Some(token)) = (ctx.user, ctx.token) else {
            return Err(AccountError::Internal("registration finished without a principal".to_string()));
        };
        info!(user_id = %user.id, "registered pending user");
        Ok(Registration { user, token })
    }

    pub async fn activate(self: &Arc<Self>, token: &str) -> Result<(), AccountError> {
        let users = Arc::clone(&self.users);
        let token = token.to_string();
        tokio::spawn(async move { activate_invitation(users.as_ref(), &token).await })
            .await
            .map_err(|e| AccountError::Internal(format!("activation task failed: {}", e)))?
    }
}
