//! Webhook notifications.
//!
//! Optional fire-and-forget delivery of monitor events to a chat webhook.
//! Failures are logged, never propagated: notification transport must not
//! influence monitoring cycles.

use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::monitor::events::MonitorEvent;

/// Webhook notification client
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

#[derive(Serialize)]
struct WebhookMessage {
    text: String,
}

impl WebhookNotifier {
    /// Create a notifier from the environment variable, if set
    pub fn from_env() -> Option<Arc<Self>> {
        std::env::var("BATTLEWATCH_WEBHOOK_URL").ok().map(|url| {
            info!("webhook notifications enabled");
            Arc::new(Self {
                client: Client::new(),
                webhook_url: url,
            })
        })
    }

    /// Create a notifier with an explicit URL
    pub fn new(webhook_url: String) -> Arc<Self> {
        Arc::new(Self {
            client: Client::new(),
            webhook_url,
        })
    }

    /// Send a text message to the webhook
    pub async fn send_message(&self, text: &str) -> Result<(), String> {
        let message = WebhookMessage {
            text: text.to_string(),
        };

        match self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await
        {
            Ok(resp) => {
                if resp.status().is_success() {
                    debug!("webhook notification sent");
                    Ok(())
                } else {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    error!("webhook notification failed: {} - {}", status, body);
                    Err(format!("HTTP {}: {}", status, body))
                }
            }
            Err(e) => {
                error!("webhook request failed: {}", e);
                Err(e.to_string())
            }
        }
    }

    /// Render and deliver one monitor event
    pub async fn notify_event(&self, event: &MonitorEvent) {
        if let Err(e) = self.send_message(&event.describe()).await {
            error!(
                subject = event.subject_tag(),
                "failed to deliver event notification: {}", e
            );
        }
    }
}
