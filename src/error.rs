//! HTTP-facing error type.
//!
//! Every domain error converts into [`ApiError`], which renders as a JSON
//! `{"error": "..."}` body. Internal failures are logged in full and reach
//! the client only as a generic message.

use std::fmt;
use std::time::Duration;

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use http::header::{HeaderValue, RETRY_AFTER};
use serde_json::json;
use tracing::error;

use crate::accounts::AccountError;
use crate::auth::AuthError;
use crate::mailer::MailError;
use crate::store::{PaginationError, StoreError};

const UNAUTHORIZED_MESSAGE: &str = "unauthorized";
const INTERNAL_MESSAGE: &str = "the server encountered a problem and could not process your request";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 400
    Validation(String),
    /// 409, naming the colliding field (`email` or `username`)
    DuplicateIdentity { field: &'static str },
    /// 409
    Conflict(String),
    /// 404
    NotFound,
    /// 401. The reason is never disclosed.
    Unauthorized,
    /// 403
    Forbidden,
    /// 429
    RateLimited { retry_after: Duration },
    /// 500. The detail is logged, not returned.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateIdentity { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{}", msg),
            Self::DuplicateIdentity { field } => write!(f, "a user with that {} already exists", field),
            Self::Conflict(msg) => write!(f, "{}", msg),
            Self::NotFound => write!(f, "not found"),
            Self::Unauthorized => write!(f, "{}", UNAUTHORIZED_MESSAGE),
            Self::Forbidden => write!(f, "forbidden"),
            Self::RateLimited { retry_after } => {
                write!(f, "rate limit exceeded, retry after {}s", retry_after_secs(*retry_after))
            }
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Whole seconds, rounded up, never below one.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(detail) => {
                error!(error = %detail, "internal error");
                INTERNAL_MESSAGE.to_string()
            }
            other => other.to_string(),
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if let Self::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs(retry_after)));
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            StoreError::DuplicateEmail => Self::DuplicateIdentity { field: "email" },
            StoreError::DuplicateUsername => Self::DuplicateIdentity { field: "username" },
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Timeout | StoreError::Database(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Store(inner) => inner.into(),
            AuthError::Internal(msg) => Self::Internal(msg),
            _ => Self::Unauthorized,
        }
    }
}

impl From<PaginationError> for ApiError {
    fn from(e: PaginationError) -> Self {
        Self::Validation(e.0)
    }
}

impl From<MailError> for ApiError {
    fn from(e: MailError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Validation(msg) => Self::Validation(msg),
            AccountError::Store(inner) => inner.into(),
            AccountError::Delivery(inner) => inner.into(),
            AccountError::Internal(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(700)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1001)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_sets_header() {
        let response = ApiError::RateLimited {
            retry_after: Duration::from_millis(2500),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "3");
    }

    #[tokio::test]
    async fn test_internal_detail_is_hidden() {
        let response = ApiError::Internal("connection refused at 10.0.0.3".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn test_duplicate_names_field() {
        let response = ApiError::from(StoreError::DuplicateEmail).into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("email"));
    }

    #[test]
    fn test_store_mapping() {
        assert_eq!(ApiError::from(StoreError::NotFound), ApiError::NotFound);
        assert_eq!(
            ApiError::from(StoreError::DuplicateUsername),
            ApiError::DuplicateIdentity { field: "username" }
        );
        assert_eq!(ApiError::from(StoreError::Timeout).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_gate_failures_are_uniform() {
        for e in [
            AuthError::MissingCredential,
            AuthError::MalformedHeader,
            AuthError::InvalidToken("expired".to_string()),
            AuthError::InvalidCredentials,
        ] {
            assert_eq!(ApiError::from(e), ApiError::Unauthorized);
        }
    }
}
