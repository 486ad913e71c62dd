//! Smartlead client — delivers email steps over the Smartlead REST API.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::channels::{ChannelSender, RenderedStep};
use crate::config::ProviderConfig;
use crate::error::ChannelError;
use crate::events::Channel;
use crate::leads::Lead;

/// Email delivery via Smartlead.
pub struct SmartleadChannel {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl SmartleadChannel {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    message_id: String,
}

#[async_trait]
impl ChannelSender for SmartleadChannel {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, lead: &Lead, step: &RenderedStep) -> Result<String, ChannelError> {
        let body = serde_json::json!({
            "lead_email": lead.email,
            "lead_id": lead.smartlead_lead_id,
            "subject": step.subject,
            "email_body": step.body,
        });

        let resp = self
            .client
            .post(format!("{}/emails/send", self.config.base_url))
            // Smartlead authenticates via an api_key query parameter.
            .query(&[("api_key", self.config.api_key.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                channel: "email".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ChannelError::RateLimited {
                channel: "email".into(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::ProviderStatus {
                provider: "smartlead".into(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendResponse = resp.json().await.map_err(|e| ChannelError::Http(e.to_string()))?;
        debug!(lead_id = %lead.id, step = step.step_number, message_id = %parsed.message_id, "Email step delivered");
        Ok(parsed.message_id)
    }
}
