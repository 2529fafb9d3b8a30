//! HS256 bearer tokens.

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::{AuthConfig, AuthError};
use crate::types::UserId;

/// Registered claims carried by every token this service issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Signs and verifies bearer tokens with a shared secret.
pub struct JwtAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl JwtAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_audience(&[&config.audience]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl: config.token_ttl(),
        }
    }

    /// Issue a token for `subject`, valid from now for the configured TTL.
    pub fn issue(&self, subject: &UserId) -> Result<String, AuthError> {
        self.issue_at(subject, chrono::Utc::now().timestamp())
    }

    /// Issue a token as if the current time were `issued_at` (unix seconds).
    pub fn issue_at(&self, subject: &UserId, issued_at: i64) -> Result<String, AuthError> {
        let claims = Claims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: issued_at,
            nbf: issued_at,
            exp: issued_at + self.ttl.as_secs() as i64,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("failed to sign token: {}", e)))
    }

    /// Check signature, expiry, not-before, issuer and audience.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            issuer: "social-test".to_string(),
            audience: "social-test".to_string(),
            token_ttl_seconds: 3600,
        }
    }

    #[test]
    fn test_issue_then_validate() {
        let auth = JwtAuthenticator::new(&config());
        let token = auth.issue(&UserId::new("u-1")).unwrap();

        let claims = auth.validate(&token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.iss, "social-test");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = JwtAuthenticator::new(&config());
        let long_ago = chrono::Utc::now().timestamp() - 7200;
        let token = auth.issue_at(&UserId::new("u-1"), long_ago).unwrap();

        assert!(matches!(auth.validate(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_not_yet_valid_token_rejected() {
        let auth = JwtAuthenticator::new(&config());
        let future = chrono::Utc::now().timestamp() + 600;
        let token = auth.issue_at(&UserId::new("u-1"), future).unwrap();

        assert!(matches!(auth.validate(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = JwtAuthenticator::new(&config());
        let verifier = JwtAuthenticator::new(&AuthConfig {
            jwt_secret: "other-secret".to_string(),
            ..config()
        });

        let token = issuer.issue(&UserId::new("u-1")).unwrap();
        assert!(verifier.validate(&token).is_err());
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let issuer = JwtAuthenticator::new(&config());
        let verifier = JwtAuthenticator::new(&AuthConfig {
            audience: "someone-else".to_string(),
            ..config()
        });

        let token = issuer.issue(&UserId::new("u-1")).unwrap();
        assert!(verifier.validate(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let auth = JwtAuthenticator::new(&config());
        assert!(auth.validate("not.a.jwt").is_err());
    }
}
