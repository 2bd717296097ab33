//! Operator alerts.
//!
//! Alerts are best effort: a failed delivery is logged and swallowed, so an
//! alert can never turn a handled saga step into a failed one.

use crate::config::SlackConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

/// Sends messages to whoever is on call.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `message`. Never fails.
    async fn send_alert(&self, message: &str);
}

/// Slack incoming-webhook notifier.
pub struct SlackNotifier {
    client: Client,
    webhook_url: Option<String>,
    enabled: bool,
}

impl SlackNotifier {
    /// Notifier posting to `config.webhook_url`.
    #[must_use]
    pub fn new(config: &SlackConfig) -> Self {
        Self {
            client: Client::new(),
            webhook_url: config.webhook_url.clone().filter(|url| !url.is_empty()),
            enabled: config.enabled,
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send_alert(&self, message: &str) {
        let Some(url) = self.webhook_url.as_deref().filter(|_| self.enabled) else {
            tracing::warn!(alert = %message, "Slack notifications disabled, alert not sent");
            return;
        };

        let response = self
            .client
            .post(url)
            .json(&json!({ "text": message }))
            .send()
            .await;

        match response {
            Ok(r) if r.status().is_success() => tracing::debug!("Slack alert sent"),
            Ok(r) => tracing::error!(status = %r.status(), alert = %message, "Slack rejected the alert"),
            Err(e) => tracing::error!(error = %e, alert = %message, "Failed to send Slack alert"),
        }
    }
}
