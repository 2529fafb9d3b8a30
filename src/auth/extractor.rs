//! Authentication extractor for HTTP requests.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use http::HeaderMap;
use http::header::AUTHORIZATION;
use http::request::Parts;
use tracing::debug;

use super::{AuthError, JwtAuthenticator, PrincipalResolver};
use crate::error::ApiError;
use crate::model::User;
use crate::types::UserId;

/// Validates bearer credentials and resolves their subject.
pub struct AuthGate {
    authenticator: Arc<JwtAuthenticator>,
    resolver: Arc<PrincipalResolver>,
}

impl AuthGate {
    pub fn new(authenticator: Arc<JwtAuthenticator>, resolver: Arc<PrincipalResolver>) -> Self {
        Self {
            authenticator,
            resolver,
        }
    }

    /// Walk the request from `NoCredential` to `SubjectResolved`.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<User, AuthError> {
        // HeaderPresent
        let header = headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingCredential)?;
        let value = header.to_str().map_err(|_| AuthError::MalformedHeader)?;
        let (scheme, token) = value
            .trim()
            .split_once(' ')
            .ok_or(AuthError::MalformedHeader)?;

        // SchemeAccepted
        if !scheme.eq_ignore_ascii_case("Bearer") {
            return Err(AuthError::UnsupportedScheme(scheme.to_string()));
        }

        // SignatureValid
        let claims = self.authenticator.validate(token.trim())?;

        // SubjectResolved
        let subject = UserId::new(claims.sub);
        let user = self
            .resolver
            .resolve(&subject)
            .await
            .map_err(|e| AuthError::UnresolvedSubject(e.to_string()))?;
        if !user.is_active {
            return Err(AuthError::UnresolvedSubject(format!(
                "user {} is not active",
                subject
            )));
        }

        Ok(user)
    }
}

/// The authenticated principal of the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    Arc<AuthGate>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = Arc::<AuthGate>::from_ref(state);
        match gate.authenticate(&parts.headers).await {
            Ok(user) => Ok(CurrentUser(user)),
            Err(reason) => {
                debug!(%reason, uri = %parts.uri, "rejecting unauthenticated request");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::cache::MemoryUserCache;
    use crate::testing::{InMemoryUsers, sample_user};
    use http::HeaderValue;
    use std::time::Duration;

    fn setup() -> (Arc<InMemoryUsers>, Arc<JwtAuthenticator>, AuthGate) {
        let users = Arc::new(InMemoryUsers::default());
        let authenticator = Arc::new(JwtAuthenticator::new(&AuthConfig {
            jwt_secret: "gate-secret".to_string(),
            ..Default::default()
        }));
        let resolver = Arc::new(PrincipalResolver::new(
            users.clone(),
            Some(Arc::new(MemoryUserCache::new(Duration::from_secs(60)))),
        ));
        let gate = AuthGate::new(authenticator.clone(), resolver);
        (users, authenticator, gate)
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_valid_token_resolves_user() {
        let (users, authenticator, gate) = setup();
        let alice = sample_user("alice", true);
        users.insert(alice.clone());

        let token = authenticator.issue(&alice.id).unwrap();
        let user = gate
            .authenticate(&headers(&format!("Bearer {}", token)))
            .await
            .unwrap();
        assert_eq!(user, alice);
    }

    #[tokio::test]
    async fn test_each_failure_state() {
        let (users, authenticator, gate) = setup();
        let pending = sample_user("pending", false);
        users.insert(pending.clone());

        assert!(matches!(
            gate.authenticate(&HeaderMap::new()).await,
            Err(AuthError::MissingCredential)
        ));
        assert!(matches!(
            gate.authenticate(&headers("Bearer")).await,
            Err(AuthError::MalformedHeader)
        ));
        assert!(matches!(
            gate.authenticate(&headers("Basic dXNlcjpwYXNz")).await,
            Err(AuthError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            gate.authenticate(&headers("Bearer not.a.token")).await,
            Err(AuthError::InvalidToken(_))
        ));

        let ghost = authenticator.issue(&UserId::new("ghost")).unwrap();
        assert!(matches!(
            gate.authenticate(&headers(&format!("Bearer {}", ghost))).await,
            Err(AuthError::UnresolvedSubject(_))
        ));

        let inactive = authenticator.issue(&pending.id).unwrap();
        assert!(matches!(
            gate.authenticate(&headers(&format!("Bearer {}", inactive))).await,
            Err(AuthError::UnresolvedSubject(_))
        ));
    }

    #[tokio::test]
    async fn test_scheme_is_case_insensitive() {
        let (users, authenticator, gate) = setup();
        let bob = sample_user("bob", true);
        users.insert(bob.clone());

        let token = authenticator.issue(&bob.id).unwrap();
        assert!(
            gate.authenticate(&headers(&format!("bearer {}", token)))
                .await
                .is_ok()
        );
    }
}
