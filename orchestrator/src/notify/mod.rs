//! Notification collaborator
//!
//! Outbound delivery is a JSON webhook; message composition stays with
//! the callers. Delivery failures are logged and swallowed by callers --
//! an approval or pipeline transition is never rolled back because a
//! notification could not be sent.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Delivery contract consumed by the approval engine (rejection
/// notices) and the pipeline (failure escalations).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message. `structured` marks the body as a JSON
    /// document rather than plain text.
    async fn send(&self, recipient: &str, subject: &str, body: &str, structured: bool)
        -> Result<()>;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    id: Uuid,
    timestamp: DateTime<Utc>,
    recipient: &'a str,
    subject: &'a str,
    body: &'a str,
    structured: bool,
}

/// Posts notifications as JSON to a configured webhook URL.
pub struct WebhookNotifier {
    webhook_url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client for WebhookNotifier");

        Self {
            webhook_url,
            client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.webhook_url.trim().is_empty()
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    /// Startup connectivity probe, mirrored in the binary's boot
    /// sequence so a dead webhook is visible immediately.
    pub async fn test_webhook(&self) -> Result<()> {
        if !self.is_enabled() {
            return Err(anyhow!("No webhook URL configured"));
        }
        self.send(
            "ops",
            "Patch orchestrator started",
            "Webhook connectivity test",
            false,
        )
        .await
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        structured: bool,
    ) -> Result<()> {
        if !self.is_enabled() {
            debug!("Webhook disabled, dropping notification '{}'", subject);
            return Ok(());
        }

        let payload = WebhookPayload {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            recipient,
            subject,
            body,
            structured,
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Webhook request failed: {}", e))?;

        if response.status().is_success() {
            info!("Notification '{}' delivered to {}", subject, recipient);
            Ok(())
        } else {
            Err(anyhow!(
                "Webhook returned status {} for '{}'",
                response.status(),
                subject
            ))
        }
    }
}

/// Notifier that only logs, used when no webhook is configured and in
/// tests that do not assert on delivery.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        _body: &str,
        _structured: bool,
    ) -> Result<()> {
        warn!("Notification (log only) to {}: {}", recipient, subject);
        Ok(())
    }
}
