use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::debug;

use super::{MailConfig, MailError, Mailer, Recipient, TemplateData, TemplateRenderer};
use crate::store::BoxFuture;

pub const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

/// Delivery through the SendGrid v3 mail API.
pub struct SendGridMailer {
    http_client: Client,
    endpoint: String,
    api_key: String,
    from_email: String,
    from_name: String,
    sandbox: bool,
    renderer: TemplateRenderer,
}

impl SendGridMailer {
    pub fn new(config: &MailConfig, api_key: String) -> Self {
        Self {
            http_client: Client::new(),
            endpoint: SENDGRID_ENDPOINT.to_string(),
            api_key,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
            sandbox: config.sandbox,
            renderer: TemplateRenderer::with_builtin(),
        }
    }

    /// Point the mailer at another endpoint (e.g. a local stub).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn deliver(
        &self,
        template: &str,
        recipient: &Recipient,
        data: &TemplateData,
    ) -> Result<(), MailError> {
        let message = self.renderer.render(template, data)?;

        let body = json!({
            "personalizations": [{
                "to": [{"email": recipient.email, "name": recipient.name}]
            }],
            "from": {"email": self.from_email, "name": self.from_name},
            "subject": message.subject,
            "content": [{
                "type": "text/html",
                "value": message.html_body
            }],
            "mail_settings": {
                "sandbox_mode": {"enable": self.sandbox}
            }
        });

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(to = %recipient.email, %status, "SendGrid accepted message");
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(classify_status(status, detail))
    }
}

/// 429 and 5xx are worth retrying; any other failure is final.
fn classify_status(status: StatusCode, detail: String) -> MailError {
    let msg = format!("SendGrid responded {}: {}", status, detail);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        MailError::Transient(msg)
    } else {
        MailError::Permanent(msg)
    }
}

impl Mailer for SendGridMailer {
    fn send<'a>(
        &'a self,
        template: &'a str,
        recipient: &'a Recipient,
        data: &'a TemplateData,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(self.deliver(template, recipient, data))
    }
}
