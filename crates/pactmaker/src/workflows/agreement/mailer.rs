use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::pdf::MaterializedDocument;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// PDF attached to every message of a single submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Attachment {
    #[serde(rename = "Name")]
    pub filename: String,
    pub content: String,
    pub content_type: String,
}

impl Attachment {
    /// `{company}_{date}.pdf`, carrying the already-encoded document.
    pub fn for_agreement(document: &MaterializedDocument, company: &str, date: &str) -> Self {
        Self {
            filename: format!("{company}_{date}.pdf"),
            content: document.base64().to_string(),
            content_type: PDF_CONTENT_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotificationMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<Arc<Attachment>>,
}

/// Provider acknowledgement for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: String,
    pub to: String,
    pub submitted_at: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("email transport unavailable: {0}")]
    Transport(String),
    #[error("email provider rejected message (code {code}): {message}")]
    Rejected { code: i64, message: String },
    #[error("email provider returned an unreadable response: {0}")]
    InvalidResponse(String),
}

/// Outbound email seam.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &NotificationMessage) -> Result<DeliveryReceipt, MailerError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PostmarkResponse {
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    submitted_at: Option<String>,
    #[serde(rename = "MessageID", default)]
    message_id: Option<String>,
    error_code: i64,
    #[serde(default)]
    message: String,
}

impl PostmarkResponse {
    fn into_receipt(self, fallback_to: &str) -> Result<DeliveryReceipt, MailerError> {
        if self.error_code != 0 {
            return Err(MailerError::Rejected {
                code: self.error_code,
                message: self.message,
            });
        }
        Ok(DeliveryReceipt {
            message_id: self.message_id.unwrap_or_default(),
            to: self.to.unwrap_or_else(|| fallback_to.to_string()),
            submitted_at: self.submitted_at,
        })
    }
}

/// Postmark `/email` endpoint client.
#[derive(Clone)]
pub struct PostmarkMailer {
    http: Client,
    server_token: String,
    endpoint: String,
}

impl PostmarkMailer {
    pub fn new(server_token: impl Into<String>, api_url: &str) -> Result<Self, MailerError> {
        let http = Client::builder()
            .build()
            .map_err(|err| MailerError::Transport(err.to_string()))?;
        Ok(Self::with_client(http, server_token, api_url))
    }

    pub fn with_client(http: Client, server_token: impl Into<String>, api_url: &str) -> Self {
        Self {
            http,
            server_token: server_token.into(),
            endpoint: format!("{}/email", api_url.trim_end_matches('/')),
        }
    }
}

impl std::fmt::Debug for PostmarkMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostmarkMailer")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Mailer for PostmarkMailer {
    async fn send(&self, message: &NotificationMessage) -> Result<DeliveryReceipt, MailerError> {
        debug!(to = %message.to, endpoint = %self.endpoint, "sending email");
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-Postmark-Server-Token", &self.server_token)
            .json(message)
            .send()
            .await
            .map_err(|err| MailerError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| MailerError::Transport(err.to_string()))?;

        match serde_json::from_str::<PostmarkResponse>(&body) {
            Ok(parsed) => parsed.into_receipt(&message.to),
            Err(_) if !status.is_success() => Err(MailerError::Rejected {
                code: i64::from(status.as_u16()),
                message: body,
            }),
            Err(err) => Err(MailerError::InvalidResponse(err.to_string())),
        }
    }
}
