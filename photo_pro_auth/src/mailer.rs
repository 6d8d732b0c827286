//! Email transports
//!
//! The delivery provider does the real work; these types only hand it a
//! rendered [`EmailMessage`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::email::EmailMessage;
use crate::error::{AuthError, AuthResult};

/// Anything that can deliver an email and report a message id
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Short transport name for status endpoints and logs
    fn name(&self) -> &'static str;

    async fn send(&self, message: &EmailMessage) -> AuthResult<String>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEVELOPMENT TRANSPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Writes messages to the log instead of sending them
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &EmailMessage) -> AuthResult<String> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "email not delivered (log transport)\n{}",
            message.text
        );
        Ok(format!("dev-{}", Utc::now().timestamp_millis()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SENDGRID
// ═══════════════════════════════════════════════════════════════════════════════

pub const SENDGRID_API_BASE: &str = "https://api.sendgrid.com";

/// SendGrid v3 mail API
pub struct SendGridMailer {
    http: reqwest::Client,
    api_key: SecretString,
    from: String,
    base_url: String,
}

impl SendGridMailer {
    pub fn new(api_key: SecretString, from: impl Into<String>) -> AuthResult<Self> {
        Self::with_base_url(api_key, from, SENDGRID_API_BASE)
    }

    pub fn with_base_url(
        api_key: SecretString,
        from: impl Into<String>,
        base_url: impl Into<String>,
    ) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_key,
            from: from.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// `"Name <addr>"` → (addr, Some(name))
    fn sender(&self) -> (String, Option<String>) {
        match (self.from.find('<'), self.from.rfind('>')) {
            (Some(start), Some(end)) if start < end => {
                let email = self.from[start + 1..end].trim().to_string();
                let name = self.from[..start].trim();
                (email, (!name.is_empty()).then(|| name.to_string()))
            }
            _ => (self.from.trim().to_string(), None),
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn send(&self, message: &EmailMessage) -> AuthResult<String> {
        let (from_email, from_name) = self.sender();

        let mut from = json!({ "email": from_email });
        if let Some(name) = from_name {
            from["name"] = json!(name);
        }

        let body = json!({
            "personalizations": [{ "to": [{ "email": message.to }] }],
            "from": from,
            "subject": message.subject,
            "content": [
                { "type": "text/plain", "value": message.text },
                { "type": "text/html", "value": message.html },
            ],
        });

        let response = self
            .http
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("N/A")
            .to_string();

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "sendgrid rejected message: {}", detail);
            return Err(AuthError::EmailDelivery(format!(
                "provider returned {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        tracing::debug!(to = %message.to, %message_id, "email accepted by sendgrid");
        Ok(message_id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY OUTBOX
// ═══════════════════════════════════════════════════════════════════════════════

/// Keeps every message in memory (tests, local tooling)
#[derive(Debug, Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<EmailMessage>>,
    fail: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that rejects every message
    pub fn failing() -> Self {
        Self {
            outbox: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.outbox.lock().clone()
    }

    pub fn last_to(&self, to: &str) -> Option<EmailMessage> {
        self.outbox.lock().iter().rev().find(|m| m.to == to).cloned()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn send(&self, message: &EmailMessage) -> AuthResult<String> {
        if self.fail {
            return Err(AuthError::EmailDelivery("memory transport set to fail".into()));
        }

        let mut outbox = self.outbox.lock();
        outbox.push(message.clone());
        Ok(format!("memory-{}", outbox.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{test_email, verification_email};
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_log_mailer_returns_dev_id() {
        let id = LogMailer.send(&test_email("dealer@farm.com")).await.unwrap();
        assert!(id.starts_with("dev-"));
    }

    #[tokio::test]
    async fn test_memory_mailer_records() {
        let mailer = MemoryMailer::new();
        mailer.send(&verification_email("a@farm.com", "111111", 10)).await.unwrap();
        mailer.send(&verification_email("b@farm.com", "222222", 10)).await.unwrap();

        assert_eq!(mailer.sent().len(), 2);
        assert!(mailer.last_to("b@farm.com").unwrap().text.contains("222222"));
        assert!(mailer.last_to("c@farm.com").is_none());

        assert!(MemoryMailer::failing().send(&test_email("a@farm.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_sendgrid_posts_message() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v3/mail/send")
                .header("authorization", "Bearer sg-key")
                .body_contains("\"email\":\"noreply@equipmentphotopro.com\"")
                .body_contains("\"name\":\"Equipment Photo Pro\"")
                .body_contains("482913");
            then.status(202).header("x-message-id", "msg-42");
        });

        let mailer = SendGridMailer::with_base_url(
            SecretString::new("sg-key".into()),
            "Equipment Photo Pro <noreply@equipmentphotopro.com>",
            server.base_url(),
        )
        .unwrap();

        let id = mailer
            .send(&verification_email("dealer@farm.com", "482913", 10))
            .await
            .unwrap();

        mock.assert();
        assert_eq!(id, "msg-42");
    }

    #[tokio::test]
    async fn test_sendgrid_rejection_is_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v3/mail/send");
            then.status(401).body("{\"errors\":[{\"message\":\"bad key\"}]}");
        });

        let mailer = SendGridMailer::with_base_url(
            SecretString::new("wrong".into()),
            "noreply@equipmentphotopro.com",
            server.base_url(),
        )
        .unwrap();

        let err = mailer.send(&test_email("dealer@farm.com")).await.unwrap_err();
        assert!(matches!(err, AuthError::EmailDelivery(ref m) if m.contains("401")));
    }
}
