use std::sync::Arc;

use tracing::{debug, info};

use super::password::verify_password;
use super::{AuthError, JwtAuthenticator};
use crate::store::{StoreError, UserRepository};

/// Exchanges an email/password pair for a bearer token.
pub struct CredentialIssuer {
    users: Arc<dyn UserRepository>,
    authenticator: Arc<JwtAuthenticator>,
}

impl CredentialIssuer {
    pub fn new(users: Arc<dyn UserRepository>, authenticator: Arc<JwtAuthenticator>) -> Self {
        Self {
            users,
            authenticator,
        }
    }

    /// Only active users can obtain a token. Unknown email, pending account
    /// and wrong password all surface as `InvalidCredentials`.
    pub async fn issue(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let credentials = match self.users.get_credentials_by_email(email).await {
            Ok(c) => c,
            Err(StoreError::NotFound) => {
                debug!("token requested for unknown or inactive email");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        let password = password.to_string();
        let hash = credentials.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .map_err(|e| AuthError::Internal(format!("stored hash unreadable: {}", e)))?;

        if !matches {
            debug!(user_id = %credentials.user.id, "password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.authenticator.issue(&credentials.user.id)?;
        info!(user_id = %credentials.user.id, "issued access token");
        Ok(token)
    }
}
