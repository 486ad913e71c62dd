//! HeyReach client — delivers LinkedIn steps over the HeyReach REST API.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use crate::channels::{ChannelSender, RenderedStep};
use crate::config::ProviderConfig;
use crate::error::ChannelError;
use crate::events::Channel;
use crate::leads::Lead;

/// LinkedIn delivery via HeyReach.
pub struct HeyreachChannel {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl HeyreachChannel {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(alias = "messageId")]
    message_id: String,
}

#[async_trait]
impl ChannelSender for HeyreachChannel {
    fn channel(&self) -> Channel {
        Channel::Linkedin
    }

    async fn send(&self, lead: &Lead, step: &RenderedStep) -> Result<String, ChannelError> {
        let body = serde_json::json!({
            "leadId": lead.heyreach_lead_id,
            "profileUrl": lead.linkedin_url,
            "message": step.body,
        });

        let resp = self
            .client
            .post(format!("{}/messages/send", self.config.base_url))
            .header("X-API-KEY", self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                channel: "linkedin".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ChannelError::RateLimited {
                channel: "linkedin".into(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::ProviderStatus {
                provider: "heyreach".into(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendResponse = resp.json().await.map_err(|e| ChannelError::Http(e.to_string()))?;
        debug!(lead_id = %lead.id, step = step.step_number, message_id = %parsed.message_id, "LinkedIn step delivered");
        Ok(parsed.message_id)
    }
}
