//! Resend-backed mail transport
//!
//! Sends blocking notification emails through the Resend HTTP API. When no
//! API key is configured the transport runs disabled and logs what it would
//! have sent, so development environments work without outbound mail.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::external::{ExternalError, MailTransport};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub api_key: String,
    pub from_address: String,
}

impl MailerConfig {
    /// Read `RESEND_API_KEY` and `BLOCKING_FROM_EMAIL` from the environment.
    /// An empty API key yields a disabled transport, not an error.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("RESEND_API_KEY").unwrap_or_default(),
            from_address: std::env::var("BLOCKING_FROM_EMAIL")
                .unwrap_or_else(|_| "billing@pawcare.example".to_string()),
        }
    }
}

#[derive(Clone)]
pub struct ResendMailer {
    client: Client,
    config: MailerConfig,
}

impl ResendMailer {
    pub fn new(config: MailerConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(MailerConfig::from_env())
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.api_key.is_empty()
    }
}

#[async_trait]
impl MailTransport for ResendMailer {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), ExternalError> {
        if !self.is_enabled() {
            tracing::info!(
                recipient = %recipient,
                subject = %subject,
                "Mail transport disabled, skipping send"
            );
            return Ok(());
        }

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "from": self.config.from_address,
                "to": [recipient],
                "subject": subject,
                "text": body,
            }))
            .send()
            .await
            .map_err(|e| ExternalError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ExternalError::Unavailable(format!(
                "mail provider returned {}: {}",
                status, detail
            )));
        }

        tracing::debug!(recipient = %recipient, "Notification email sent");
        Ok(())
    }
}
