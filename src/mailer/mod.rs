//! Confirmation message delivery.

mod log_mailer;
mod sendgrid;
mod templates;

pub use log_mailer::LogMailer;
pub use sendgrid::{SENDGRID_ENDPOINT, SendGridMailer};
pub use templates::{RenderedMessage, Template, TemplateRenderer};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::store::BoxFuture;

pub const INVITATION_TEMPLATE: &str = "user_invitation";

pub type TemplateData = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// SendGrid key; without one messages are only logged
    pub sendgrid_api_key: Option<String>,
    pub from_email: String,
    pub from_name: String,
    /// Ask SendGrid to validate without delivering
    pub sandbox: bool,
    /// Base URL of the web client; activation links point at `{frontend_url}/confirm/{token}`
    pub frontend_url: String,
    pub invitation_ttl_seconds: u64,
    pub max_attempts: u32,
    /// Backoff after failed attempt `n` (1-based) is `n * retry_backoff_ms`
    pub retry_backoff_ms: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sendgrid_api_key: std::env::var("SENDGRID_API_KEY").ok(),
            from_email: std::env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "hello@social.local".to_string()),
            from_name: "Social".to_string(),
            sandbox: false,
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            invitation_ttl_seconds: 3 * 24 * 60 * 60,
            max_attempts: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl MailConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn invitation_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.invitation_ttl_seconds as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// Worth retrying: network failure, rate limiting, provider 5xx
    Transient(String),
    /// Retrying cannot help: rejected request, bad template, bad recipient
    Permanent(String),
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "Transient delivery failure: {}", msg),
            Self::Permanent(msg) => write!(f, "Permanent delivery failure: {}", msg),
        }
    }
}

impl std::error::Error for MailError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

pub trait Mailer: Send + Sync {
    fn send<'a>(
        &'a self,
        template: &'a str,
        recipient: &'a Recipient,
        data: &'a TemplateData,
    ) -> BoxFuture<'a, Result<(), MailError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Send with linear backoff between transient failures. A permanent
/// failure ends the attempts immediately.
pub async fn send_with_retry(
    mailer: &dyn Mailer,
    policy: RetryPolicy,
    template: &str,
    recipient: &Recipient,
    data: &TemplateData,
) -> Result<(), MailError> {
    let mut attempt = 1;
    loop {
        match mailer.send(template, recipient, data).await {
            Ok(()) => {
                info!(template, email = %recipient.email, attempt, "message delivered");
                return Ok(());
            }
            Err(MailError::Transient(msg)) if attempt < policy.max_attempts => {
                let delay = policy.backoff * attempt;
                warn!(
                    template,
                    email = %recipient.email,
                    attempt,
                    error = %msg,
                    retry_in = ?delay,
                    "delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(template, email = %recipient.email, attempt, error = %e, "delivery failed");
                return Err(e);
            }
        }
    }
}

/// SendGrid when a key is configured, otherwise the logging mailer.
pub fn build_mailer(config: &MailConfig) -> Arc<dyn Mailer> {
    match &config.sendgrid_api_key {
        Some(key) if !key.is_empty() => Arc::new(SendGridMailer::new(config, key.clone())),
        _ => {
            warn!("no SendGrid API key configured, confirmation messages will only be logged");
            Arc::new(LogMailer::new(TemplateRenderer::with_builtin()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedMailer;

    fn recipient() -> Recipient {
        Recipient {
            name: "alice".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let mailer = ScriptedMailer::new(vec![
            Err(MailError::Transient("503".to_string())),
            Err(MailError::Transient("503".to_string())),
            Ok(()),
        ]);
        let started = tokio::time::Instant::now();

        send_with_retry(
            &mailer,
            RetryPolicy::default(),
            INVITATION_TEMPLATE,
            &recipient(),
            &TemplateData::new(),
        )
        .await
        .unwrap();

        assert_eq!(mailer.attempts(), 3);
        // 1s after the first failure, 2s after the second
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let mailer = ScriptedMailer::new(vec![Err(MailError::Transient("timeout".to_string()))]);

        let err = send_with_retry(
            &mailer,
            RetryPolicy::default(),
            INVITATION_TEMPLATE,
            &recipient(),
            &TemplateData::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err, MailError::Transient("timeout".to_string()));
        assert_eq!(mailer.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_stops_immediately() {
        let mailer = ScriptedMailer::new(vec![Err(MailError::Permanent("400".to_string()))]);

        let err = send_with_retry(
            &mailer,
            RetryPolicy::default(),
            INVITATION_TEMPLATE,
            &recipient(),
            &TemplateData::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MailError::Permanent(_)));
        assert_eq!(mailer.attempts(), 1);
    }

    #[test]
    fn test_config_policy() {
        let config = MailConfig {
            max_attempts: 0,
            retry_backoff_ms: 250,
            ..Default::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff, Duration::from_millis(250));
    }
}
