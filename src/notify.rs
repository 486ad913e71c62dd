//! Human-notification collaborator.
//!
//! Alerts go to a configured webhook (Slack-style incoming hook) when one
//! is set, and always to the log. Alert delivery is best-effort — a failed
//! notification never fails the step that raised it.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::leads::Lead;
use crate::orchestrator::Notifier;

/// Posts alerts to an incoming-webhook URL, or logs when none is set.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    async fn post(&self, body: serde_json::Value) {
        let Some(ref url) = self.url else {
            return;
        };
        if let Err(e) = self.client.post(url).json(&body).send().await {
            warn!(error = %e, "Alert webhook delivery failed");
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn interest(&self, lead: &Lead, level: &str, signals: &[String]) {
        info!(
            lead_id = %lead.id,
            lead = %lead.display_name(),
            level,
            ?signals,
            "Interested reply — human takeover"
        );
        self.post(serde_json::json!({
            "type": "interest",
            "lead_id": lead.id,
            "lead": lead.display_name(),
            "email": lead.email,
            "interest_level": level,
            "signals": signals,
        }))
        .await;
    }

    async fn failure(&self, lead: &Lead, reason: &str) {
        warn!(lead_id = %lead.id, reason, "Escalating failure to a human");
        self.post(serde_json::json!({
            "type": "failure",
            "lead_id": lead.id,
            "email": lead.email,
            "reason": reason,
        }))
        .await;
    }
}
