//! Template rendering provider.
//!
//! The engine treats rendering as a collaborator behind the
//! [`TemplateRenderer`] seam. [`PlaceholderRenderer`] is the built-in
//! implementation: straight `{{variable}}` substitution against the tracked
//! email, with no randomness, so the same inputs always render the same
//! subject and body.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{FollowupTemplate, TrackedEmail};

/// A rendered subject/body pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Trait for template rendering implementations.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    /// Renders the template against the email for the given sequence level.
    async fn render(
        &self,
        template: &FollowupTemplate,
        email: &TrackedEmail,
        sequence: u32,
    ) -> Result<RenderedMessage>;
}

/// Built-in placeholder substitution renderer.
///
/// Supported placeholders: `{{recipient_name}}`, `{{recipient_email}}`,
/// `{{sender_name}}`, `{{sender_email}}`, `{{subject}}`, `{{sent_date}}`,
/// `{{sequence}}`. Unknown placeholders pass through untouched.
pub struct PlaceholderRenderer;

impl PlaceholderRenderer {
    fn substitute(pattern: &str, email: &TrackedEmail, sequence: u32) -> String {
        let recipient = email.recipients.first();
        let recipient_email = recipient.map(|a| a.email.as_str()).unwrap_or("");
        let recipient_name = recipient
            .and_then(|a| a.name.as_deref())
            .unwrap_or(recipient_email);
        let sender_name = email
            .sender
            .name
            .as_deref()
            .unwrap_or(email.sender.email.as_str());

        pattern
            .replace("{{recipient_name}}", recipient_name)
            .replace("{{recipient_email}}", recipient_email)
            .replace("{{sender_name}}", sender_name)
            .replace("{{sender_email}}", &email.sender.email)
            .replace("{{subject}}", &email.subject)
            .replace("{{sent_date}}", &email.sent_at.format("%Y-%m-%d").to_string())
            .replace("{{sequence}}", &sequence.to_string())
    }
}

#[async_trait]
impl TemplateRenderer for PlaceholderRenderer {
    async fn render(
        &self,
        template: &FollowupTemplate,
        email: &TrackedEmail,
        sequence: u32,
    ) -> Result<RenderedMessage> {
        Ok(RenderedMessage {
            subject: Self::substitute(&template.subject, email, sequence),
            body: Self::substitute(&template.body, email, sequence),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, EmailId, EmailStatus, TemplateId};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn sample_email() -> TrackedEmail {
        TrackedEmail {
            id: EmailId::from("email-1"),
            sender: Address::with_name("sales@example.com", "Dana Sales"),
            recipients: vec![Address::with_name("lead@example.org", "Lee Lead")],
            subject: "Q3 Proposal".to_string(),
            sent_at: Utc.with_ymd_and_hms(2026, 8, 3, 8, 0, 0).unwrap(),
            status: EmailStatus::Pending,
            bounce_type: None,
            conversation_id: None,
        }
    }

    fn sample_template() -> FollowupTemplate {
        FollowupTemplate {
            id: TemplateId::from("tpl-1"),
            sequence: 1,
            subject: "Re: {{subject}}".to_string(),
            body: "Hi {{recipient_name}}, following up on my {{sent_date}} email. -- {{sender_name}}"
                .to_string(),
            delay_hours: Some(24),
            active: true,
        }
    }

    #[tokio::test]
    async fn substitutes_all_placeholders() {
        let rendered = PlaceholderRenderer
            .render(&sample_template(), &sample_email(), 1)
            .await
            .unwrap();

        assert_eq!(rendered.subject, "Re: Q3 Proposal");
        assert_eq!(
            rendered.body,
            "Hi Lee Lead, following up on my 2026-08-03 email. -- Dana Sales"
        );
    }

    #[tokio::test]
    async fn rendering_is_deterministic() {
        let template = sample_template();
        let email = sample_email();

        let first = PlaceholderRenderer.render(&template, &email, 2).await.unwrap();
        let second = PlaceholderRenderer.render(&template, &email, 2).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unknown_placeholders_pass_through() {
        let mut template = sample_template();
        template.body = "Hello {{mystery}}".to_string();

        let rendered = PlaceholderRenderer
            .render(&template, &sample_email(), 1)
            .await
            .unwrap();
        assert_eq!(rendered.body, "Hello {{mystery}}");
    }

    #[tokio::test]
    async fn nameless_recipient_falls_back_to_address() {
        let mut email = sample_email();
        email.recipients = vec![Address::new("lead@example.org")];
        let mut template = sample_template();
        template.body = "Hi {{recipient_name}}".to_string();

        let rendered = PlaceholderRenderer.render(&template, &email, 1).await.unwrap();
        assert_eq!(rendered.body, "Hi lead@example.org");
    }
}
