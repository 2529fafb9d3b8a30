use tracing::info;

use super::{MailError, Mailer, Recipient, TemplateData, TemplateRenderer};
use crate::store::BoxFuture;

/// Development mailer: renders the message and logs its envelope.
///
/// The body is never logged, since it carries the activation token.
pub struct LogMailer {
    renderer: TemplateRenderer,
}

impl LogMailer {
    pub fn new(renderer: TemplateRenderer) -> Self {
        Self { renderer }
    }
}

impl Mailer for LogMailer {
    fn send<'a>(
        &'a self,
        template: &'a str,
        recipient: &'a Recipient,
        data: &'a TemplateData,
    ) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            let message = self.renderer.render(template, data)?;
            info!(
                template,
                to = %recipient.email,
                subject = %message.subject,
                body_bytes = message.html_body.len(),
                "mail delivery skipped (no provider configured)"
            );
            Ok(())
        })
    }
}
