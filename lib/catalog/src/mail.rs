//! Outbound email port.

use crate::templates::TemplateRenderer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

/// An email to send, described by template name and data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub recipient: String,
    pub subject: String,
    pub template: String,
    #[serde(default)]
    pub data: HashMap<String, JsonValue>,
}

/// A message with its body rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub recipient: String,
    pub subject: String,
    pub html: String,
}

impl MailMessage {
    /// Renders the body with the given renderer.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTemplate` if the template is not registered.
    pub fn render(&self, renderer: &TemplateRenderer) -> Result<RenderedMail, MailError> {
        let html = renderer
            .render(&self.template, &self.data)
            .ok_or_else(|| MailError::UnknownTemplate {
                name: self.template.clone(),
            })?;
        Ok(RenderedMail {
            recipient: self.recipient.clone(),
            subject: self.subject.clone(),
            html,
        })
    }
}

/// Errors from sending email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// No template with this name.
    UnknownTemplate { name: String },
    /// The transport failed or rejected the message.
    Transport { details: String },
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTemplate { name } => write!(f, "unknown mail template '{name}'"),
            Self::Transport { details } => write!(f, "mail transport failed: {details}"),
        }
    }
}

impl std::error::Error for MailError {}

/// Renders and transmits email.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends the message.
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}
