use std::collections::HashMap;

use super::{INVITATION_TEMPLATE, MailError, TemplateData};

/// Subject and body produced by rendering a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Clone)]
pub struct Template {
    pub id: String,
    pub subject: String,
    pub html_body: String,
}

/// Simple template renderer using {{variable}} syntax
pub struct TemplateRenderer {
    templates: HashMap<String, Template>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// A renderer preloaded with the templates this service sends.
    pub fn with_builtin() -> Self {
        let mut renderer = Self::new();
        renderer.register(Template {
            id: INVITATION_TEMPLATE.to_string(),
            subject: "Finish registration with {{app}}".to_string(),
            html_body: r#"<!doctype html>
<html>
  <body>
    <p>Hi {{username}},</p>
    <p>Thanks for signing up for {{app}}. We're excited to have you on board!</p>
    <p>Before you can start using {{app}}, you need to confirm your email address.
       Click the link below to confirm your email address:</p>
    <p><a href="{{activation_url}}">{{activation_url}}</a></p>
    <p>If you want to activate your account manually, copy and paste the link above into your browser.</p>
    <p>If you didn't sign up for {{app}}, you can safely ignore this email.</p>
    <p>Thanks,<br/>The {{app}} Team</p>
  </body>
</html>
"#
            .to_string(),
        });
        renderer
    }

    pub fn register(&mut self, template: Template) {
        self.templates.insert(template.id.clone(), template);
    }

    /// Unknown templates are a permanent failure: retrying cannot help.
    pub fn render(&self, template_id: &str, data: &TemplateData) -> Result<RenderedMessage, MailError> {
        let template = self
            .templates
            .get(template_id)
            .ok_or_else(|| MailError::Permanent(format!("unknown template {}", template_id)))?;

        Ok(RenderedMessage {
            subject: render_string(&template.subject, data, false),
            html_body: render_string(&template.html_body, data, true),
        })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Substitute `{{key}}` placeholders. Body values are HTML-escaped so they
/// are safe both as text and inside double-quoted attributes.
fn render_string(template: &str, data: &TemplateData, escape_html: bool) -> String {
    let mut result = template.to_string();

    for (key, value) in data {
        let placeholder = format!("{{{{{}}}}}", key);
        let replacement = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        let replacement = if escape_html {
            html_escape::encode_double_quoted_attribute(&replacement).into_owned()
        } else {
            replacement
        };
        result = result.replace(&placeholder, &replacement);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, serde_json::Value)]) -> TemplateData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_invitation() {
        let renderer = TemplateRenderer::with_builtin();
        let message = renderer
            .render(
                INVITATION_TEMPLATE,
                &data(&[
                    ("username", serde_json::json!("alice")),
                    ("app", serde_json::json!("Social")),
                    (
                        "activation_url",
                        serde_json::json!("http://localhost:5173/confirm/abc"),
                    ),
                ]),
            )
            .unwrap();

        assert_eq!(message.subject, "Finish registration with Social");
        assert!(message.html_body.contains("Hi alice,"));
        assert!(
            message
                .html_body
                .contains(r#"href="http://localhost:5173/confirm/abc""#)
        );
        assert!(!message.html_body.contains("{{"));
    }

    #[test]
    fn test_render_numbers_and_missing_keys() {
        let mut renderer = TemplateRenderer::new();
        renderer.register(Template {
            id: "count".to_string(),
            subject: "{{n}} new".to_string(),
            html_body: "{{n}} messages for {{who}}".to_string(),
        });

        let message = renderer
            .render("count", &data(&[("n", serde_json::json!(3))]))
            .unwrap();
        assert_eq!(message.subject, "3 new");
        assert_eq!(message.html_body, "3 messages for {{who}}");
    }

    #[test]
    fn test_body_values_are_escaped() {
        let renderer = TemplateRenderer::with_builtin();
        let message = renderer
            .render(
                INVITATION_TEMPLATE,
                &data(&[
                    ("username", serde_json::json!("<script>alert(1)</script>")),
                    ("app", serde_json::json!("Tom & Jerry")),
                    ("activation_url", serde_json::json!("https://x.test/\"onclick=\"")),
                ]),
            )
            .unwrap();

        assert!(message.html_body.contains("Hi &lt;script&gt;alert(1)&lt;/script&gt;,"));
        assert!(!message.html_body.contains("<script>"));
        assert!(message.html_body.contains(r#"href="https://x.test/&quot;onclick=&quot;""#));
        // Subjects are plain text
        assert_eq!(message.subject, "Finish registration with Tom & Jerry");
    }

    #[test]
    fn test_unknown_template_is_permanent() {
        let renderer = TemplateRenderer::new();
        assert!(matches!(
            renderer.render("nope", &TemplateData::new()),
            Err(MailError::Permanent(_))
        ));
    }
}
