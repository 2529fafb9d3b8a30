// Core modules
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod store;
pub mod types;

// Request gating
pub mod auth;
pub mod cache;
pub mod ratelimit;

// Workflows
pub mod accounts;
pub mod mailer;
pub mod saga;

pub mod api;

#[cfg(test)]
mod testing;

// Re-export key types and functions
pub use api::{AppState, create_router};
pub use config::{AppConfig, load_config};
pub use db::{DatabaseConfig, create_connection, ensure_schema};
pub use error::ApiError;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tracing::{info, warn};

use cache::build_cache;
use mailer::build_mailer;
use store::Storage;

/// Connect to the store, apply the schema and assemble the HTTP router.
///
/// Background maintenance (rate-window sweeper, in-process cache purge) is
/// started here, so this must be called from inside a tokio runtime.
pub async fn build_app(config: &AppConfig) -> Result<Router> {
    let db = create_connection(config.database.clone()).await?;
    ensure_schema(&db).await?;

    let cache = build_cache(&config.cache)?;
    let mailer = build_mailer(&config.mail);
    let state = AppState::new(Storage::new(db), cache, mailer, config);

    if config.auth.uses_default_secret() {
        warn!("AUTH_TOKEN_SECRET is not set; tokens are signed with the public development secret");
    }

    if let Some(limiter) = &state.limiter {
        limiter.spawn_sweeper();
        info!(
            limit = config.rate_limit.requests_per_window,
            window_seconds = config.rate_limit.window_seconds,
            "rate limiting enabled"
        );
    }

    Ok(create_router(
        state,
        Duration::from_secs(config.server.request_timeout_seconds),
    ))
}
