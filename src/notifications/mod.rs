//! Outbound email delivery.
//!
//! A [`Mailer`] is the only way the service talks to an email provider. The
//! production implementation posts JSON to an HTTP mail relay; without a relay
//! configured, [`LogMailer`] writes messages to the log instead.

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail relay request failed: {0}")]
    Transport(String),
    #[error("Mail relay rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    /// Base64-encoded content
    pub content: String,
}

impl Attachment {
    pub fn from_bytes(filename: impl Into<String>, content_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            content: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

pub type SharedMailer = Arc<dyn Mailer>;

/// Posts messages to `{relay_url}` as JSON with an optional bearer token
#[derive(Clone)]
pub struct HttpRelayMailer {
    client: reqwest::Client,
    relay_url: String,
    token: Option<String>,
}

impl HttpRelayMailer {
    pub fn new(relay_url: impl Into<String>, token: Option<String>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            relay_url: relay_url.into(),
            token,
        })
    }
}

#[async_trait]
impl Mailer for HttpRelayMailer {
    #[instrument(skip(self, message), fields(to = %message.to, subject = %message.subject))]
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if message.to.trim().is_empty() {
            return Err(MailError::InvalidMessage("empty recipient".into()));
        }
        let mut request = self.client.post(&self.relay_url).json(message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        info!("email handed to relay");
        Ok(())
    }
}

/// Development mailer; messages only reach the log
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            attachments = message.attachments.len(),
            "email (log mailer): {}",
            message.text
        );
        Ok(())
    }
}

/// Picks the relay mailer when one is configured
pub fn mailer_from_config(config: &AppConfig) -> Result<SharedMailer, MailError> {
    match config.mail_relay_url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => {
            info!(relay = %url, "using HTTP mail relay");
            Ok(Arc::new(HttpRelayMailer::new(
                url,
                config.mail_relay_token.clone(),
            )?))
        }
        None => {
            info!("no mail relay configured, emails will be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> EmailMessage {
        EmailMessage {
            from: "no-reply@sms.local".into(),
            to: "ops@northern.example".into(),
            subject: "Low stock".into(),
            text: "Impeller below minimum".into(),
            attachments: vec![],
        }
    }

    #[tokio::test]
    async fn relay_mailer_posts_json_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer relay-token"))
            .and(body_partial_json(serde_json::json!({
                "to": "ops@northern.example",
                "subject": "Low stock"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mailer =
            HttpRelayMailer::new(format!("{}/send", server.uri()), Some("relay-token".into()))
                .unwrap();
        mailer.send(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn relay_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let mailer = HttpRelayMailer::new(server.uri(), None).unwrap();
        let err = mailer.send(&message()).await.unwrap_err();
        assert_matches!(err, MailError::Rejected { status: 503, .. });
    }

    #[test]
    fn attachment_is_base64() {
        let a = Attachment::from_bytes("INV-2024-000001.pdf", "application/pdf", b"%PDF");
        assert_eq!(a.content, "JVBERg==");
    }
}
