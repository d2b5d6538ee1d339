// SPDX-License-Identifier: MIT

//! Transactional mail delivery.
//!
//! [`HttpMailer`] posts to the configured mail API; without a configured
//! endpoint it logs the message and succeeds, keeping local development
//! working end to end. [`RecordingMailer`] captures messages so tests can
//! read the OTP they are expected to submit.

use crate::config::Config;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;

/// One outbound message.
#[derive(Debug, Clone, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mail delivery boundary.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<()>;
}

/// Mailer backed by an HTTP mail API.
pub struct HttpMailer {
    client: Option<reqwest::Client>,
    api_url: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn from_config(config: &Config) -> Self {
        match &config.mailer_api_url {
            Some(url) => Self {
                client: Some(reqwest::Client::new()),
                api_url: url.clone(),
                api_key: config.mailer_api_key.clone(),
            },
            None => {
                tracing::warn!("MAILER_API_URL not set, mailer running offline");
                Self {
                    client: None,
                    api_url: String::new(),
                    api_key: None,
                }
            }
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: MailMessage) -> Result<()> {
        let Some(client) = &self.client else {
            tracing::info!(to = %message.to, subject = %message.subject, "Mock mail send");
            return Ok(());
        };

        let mut request = client.post(&self.api_url).json(&message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Mail API request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Mail API returned {}",
                response.status()
            )));
        }

        tracing::info!(to = %message.to, subject = %message.subject, "Mail sent");
        Ok(())
    }
}

/// Captures sent messages instead of delivering them.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_mailer_captures_in_order() {
        let mailer = RecordingMailer::new();
        for i in 0..3 {
            mailer
                .send(MailMessage {
                    to: format!("u{i}@example.com"),
                    subject: "Verify your email".to_string(),
                    body: format!("code {i}"),
                })
                .await
                .unwrap();
        }

        let sent = mailer.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].to, "u0@example.com");
        assert_eq!(sent[2].body, "code 2");
    }

    #[tokio::test]
    async fn test_offline_http_mailer_succeeds() {
        let mailer = HttpMailer::from_config(&Config::test_default());
        mailer
            .send(MailMessage {
                to: "u@example.com".to_string(),
                subject: "Hi".to_string(),
                body: "Hello".to_string(),
            })
            .await
            .unwrap();
    }
}
