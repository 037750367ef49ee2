//! Resend email transport.

use crate::config::MailConfig;
use async_trait::async_trait;
use coursehub_catalog::{MailError, MailMessage, Mailer, RenderedMail, TemplateRenderer};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};

/// Renders templates locally and posts the HTML to Resend.
pub struct ResendMailer {
    http: Client,
    api_key: String,
    from: String,
    api_base: String,
    renderer: TemplateRenderer,
}

impl ResendMailer {
    #[must_use]
    pub fn new(http: Client, config: &MailConfig, renderer: TemplateRenderer) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            renderer,
        }
    }

    fn payload(&self, mail: &RenderedMail) -> serde_json::Value {
        json!({
            "from": self.from,
            "to": [mail.recipient],
            "subject": mail.subject,
            "html": mail.html,
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    #[instrument(skip_all, fields(template = %message.template))]
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let rendered = message.render(&self.renderer)?;

        let response = self
            .http
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&self.payload(&rendered))
            .send()
            .await
            .map_err(|e| MailError::Transport {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Transport {
                details: format!("{status}: {body}"),
            });
        }

        debug!("mail accepted by transport");
        Ok(())
    }
}

impl std::fmt::Debug for ResendMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendMailer")
            .field("from", &self.from)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}
