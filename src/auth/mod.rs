//! Identity: bearer tokens, principal resolution and authorization.
//!
//! A protected request walks the states
//! `NoCredential → HeaderPresent → SchemeAccepted → SignatureValid →
//! SubjectResolved`. Falling out at any step yields the same 401; the
//! concrete reason is only logged at debug level.
//!
//! ## Usage
//!
//! ```ignore
//! async fn handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
//!     // `user` is the resolved principal
//! }
//! ```

mod extractor;
mod issuer;
pub mod password;
mod policy;
mod resolver;
mod token;

pub use extractor::{AuthGate, CurrentUser};
pub use issuer::CredentialIssuer;
pub use policy::authorize_post_mutation;
pub use resolver::PrincipalResolver;
pub use token::{Claims, JwtAuthenticator};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::store::StoreError;

pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 3 * 24 * 60 * 60;

/// Development-only signing secret used when `AUTH_TOKEN_SECRET` is unset.
pub const DEFAULT_JWT_SECRET: &str = "example";

/// Token signing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 shared secret
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
    /// Lifetime of issued tokens in seconds (default: 3 days)
    pub token_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: std::env::var("AUTH_TOKEN_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string()),
            issuer: "social-api".to_string(),
            audience: "social-api".to_string(),
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

/// Authentication errors.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// No Authorization header
    MissingCredential,
    /// Header is not `<scheme> <token>` or not valid ASCII
    MalformedHeader,
    /// Scheme other than Bearer
    UnsupportedScheme(String),
    /// Signature, expiry, not-before, issuer or audience check failed
    InvalidToken(String),
    /// Subject could not be resolved to an active principal
    UnresolvedSubject(String),
    /// Wrong email/password pair, or the account is not active
    InvalidCredentials,
    /// Store failure outside the gate (credential issuance)
    Store(StoreError),
    Internal(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "Authorization header is missing"),
            Self::MalformedHeader => write!(f, "Authorization header is malformed"),
            Self::UnsupportedScheme(scheme) => write!(f, "Unsupported authorization scheme: {}", scheme),
            Self::InvalidToken(msg) => write!(f, "Invalid token: {}", msg),
            Self::UnresolvedSubject(msg) => write!(f, "Unresolved subject: {}", msg),
            Self::InvalidCredentials => write!(f, "Invalid credentials"),
            Self::Store(e) => write!(f, "{}", e),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_secret_is_detected() {
        let config = AuthConfig {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            ..Default::default()
        };
        assert!(config.uses_default_secret());

        let config = AuthConfig {
            jwt_secret: "a-real-secret".to_string(),
            ..Default::default()
        };
        assert!(!config.uses_default_secret());
    }
}
