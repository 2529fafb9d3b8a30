// REST API endpoints, all under /v1

mod auth;
mod posts;
mod users;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{ConnectInfo, FromRef, Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::Serialize;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::accounts::Accounts;
use crate::auth::{AuthGate, CredentialIssuer, JwtAuthenticator, PrincipalResolver};
use crate::cache::UserCache;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::mailer::Mailer;
use crate::ratelimit::{Admission, FixedWindowLimiter};
use crate::store::Storage;

/// Client key used when the peer address is unknown (e.g. in-process calls).
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub accounts: Arc<Accounts>,
    pub issuer: Arc<CredentialIssuer>,
    pub gate: Arc<AuthGate>,
    /// `None` when admission control is disabled
    pub limiter: Option<Arc<FixedWindowLimiter>>,
}

impl AppState {
    pub fn new(
        storage: Storage,
        cache: Option<Arc<dyn UserCache>>,
        mailer: Arc<dyn Mailer>,
        config: &AppConfig,
    ) -> Self {
        let authenticator = Arc::new(JwtAuthenticator::new(&config.auth));
        let resolver = Arc::new(PrincipalResolver::new(storage.users.clone(), cache));
        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(FixedWindowLimiter::from_config(&config.rate_limit)));

        Self {
            accounts: Arc::new(Accounts::new(storage.users.clone(), mailer, &config.mail)),
            issuer: Arc::new(CredentialIssuer::new(storage.users.clone(), authenticator.clone())),
            gate: Arc::new(AuthGate::new(authenticator, resolver)),
            limiter,
            storage,
        }
    }
}

impl FromRef<AppState> for Arc<AuthGate> {
    fn from_ref(state: &AppState) -> Self {
        state.gate.clone()
    }
}

pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    let v1 = Router::new()
        .route("/health", get(health_check))
        .route("/authentication/user", post(auth::register_user))
        .route("/authentication/token", post(auth::create_token))
        .route("/users/activate/{token}", put(auth::activate_user))
        .route("/users/feed", get(users::get_feed))
        .route("/users/{id}", get(users::get_user))
        .route("/users/{id}/follow", put(users::follow_user))
        .route("/users/{id}/unfollow", put(users::unfollow_user))
        .route("/posts", post(posts::create_post))
        .route(
            "/posts/{id}",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/posts/{id}/comments", post(posts::create_comment));

    Router::new()
        .nest("/v1", v1)
        .layer(middleware::from_fn_with_state(state.clone(), admission_control))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

/// Gate every request through the rate limiter, keyed by peer IP.
async fn admission_control(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(limiter) = &state.limiter else {
        return next.run(request).await;
    };

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    match limiter.allow(&client) {
        Admission::Permitted => next.run(request).await,
        Admission::Denied { retry_after } => {
            warn!(%client, path = %request.uri().path(), ?retry_after, "rate limit exceeded");
            ApiError::RateLimited { retry_after }.into_response()
        }
    }
}

/// Wrap a payload in the `{"data": ...}` envelope.
pub(crate) fn envelope<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "data": data }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "available",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}


#[cfg(test)]
mod tests {
    use http::{Method, StatusCode, header};

    use super::test_support::*;
    use crate::ratelimit::RateLimitConfig;

    #[tokio::test]
    async fn test_health() {
        let app = test_app(unlimited()).await;
        let (status, body) = app.call_json(Method::GET, "/v1/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "available");
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_with_retry_after() {
        let app = test_app(RateLimitConfig {
            enabled: true,
            requests_per_window: 2,
            window_seconds: 60,
        })
        .await;

        for _ in 0..2 {
            let (status, _) = app.call(Method::GET, "/v1/health", None, None).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, response) = app.call(Method::GET, "/v1/health", None, None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));
    }

    #[tokio::test]
    async fn test_protected_route_without_token() {
        let app = test_app(unlimited()).await;
        let (status, body) = app.call_json(Method::GET, "/v1/users/feed", None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_garbage_token_gets_the_same_response() {
        let app = test_app(unlimited()).await;
        let (status, body) = app
            .call_json(Method::GET, "/v1/users/feed", Some("not-a-jwt"), None)
            .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }
}
