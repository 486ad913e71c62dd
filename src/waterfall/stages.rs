//! Evidence stages — ordered fallback sources for the waterfall.
//!
//! Each stage is a thin JSON client over one evidence source. Stages never
//! decide sufficiency; they only fetch and score. Adding or reordering
//! stages is a change to the resolver's stage list, not to any control flow.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::error::ResearchError;
use crate::leads::Lead;
use crate::waterfall::types::{RecencyBucket, Trigger};

/// One evidence source in the waterfall.
#[async_trait]
pub trait EvidenceStage: Send + Sync {
    /// Stage name, used in logs and `stages_used`.
    fn name(&self) -> &str;

    /// Fetch zero or more triggers for a lead.
    async fn fetch(&self, lead: &Lead) -> Result<Vec<Trigger>, ResearchError>;
}

/// Wire shape shared by the evidence APIs.
#[derive(Debug, Deserialize)]
struct WireTrigger {
    #[serde(alias = "type")]
    kind: String,
    fact: String,
    #[serde(default)]
    recency: Option<String>,
    #[serde(alias = "score")]
    relevance_score: u8,
}

fn into_triggers(wire: Vec<WireTrigger>) -> Vec<Trigger> {
    wire.into_iter()
        .map(|w| {
            Trigger::new(
                w.kind,
                w.fact,
                w.recency
                    .as_deref()
                    .map(RecencyBucket::parse_lenient)
                    .unwrap_or(RecencyBucket::Unknown),
                w.relevance_score,
            )
        })
        .collect()
}

async fn fetch_json(
    stage: &str,
    client: &reqwest::Client,
    url: String,
    api_key: &SecretString,
    body: serde_json::Value,
) -> Result<Vec<Trigger>, ResearchError> {
    let resp = client
        .post(&url)
        .bearer_auth(api_key.expose_secret())
        .json(&body)
        .send()
        .await
        .map_err(|e| ResearchError::StageFailed {
            stage: stage.into(),
            reason: e.to_string(),
        })?;

    if !resp.status().is_success() {
        return Err(ResearchError::StageFailed {
            stage: stage.into(),
            reason: format!("status {}", resp.status()),
        });
    }

    let wire: Vec<WireTrigger> = resp.json().await.map_err(|e| {
        ResearchError::MalformedEvidence {
            stage: stage.into(),
            reason: e.to_string(),
        }
    })?;

    debug!(stage, count = wire.len(), "Evidence stage returned triggers");
    Ok(into_triggers(wire))
}

/// Stage 1 — personal-source lookup: the lead's own recent activity
/// (role changes, posts, publications).
pub struct PersonalSourceStage {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl PersonalSourceStage {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl EvidenceStage for PersonalSourceStage {
    fn name(&self) -> &str {
        "personal_source"
    }

    async fn fetch(&self, lead: &Lead) -> Result<Vec<Trigger>, ResearchError> {
        let body = serde_json::json!({
            "email": lead.email,
            "linkedin_url": lead.linkedin_url,
            "name": lead.display_name(),
        });
        fetch_json(
            self.name(),
            &self.client,
            format!("{}/person/activity", self.base_url),
            &self.api_key,
            body,
        )
        .await
    }
}

/// Stage 2 — organization-source lookup: company news, funding, hiring.
pub struct OrganizationSourceStage {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl OrganizationSourceStage {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl EvidenceStage for OrganizationSourceStage {
    fn name(&self) -> &str {
        "organization_source"
    }

    async fn fetch(&self, lead: &Lead) -> Result<Vec<Trigger>, ResearchError> {
        let company = lead.company_name.clone().unwrap_or_else(|| {
            // Fall back to the email domain when no company name is known.
            lead.email
                .split_once('@')
                .map(|(_, domain)| domain.to_string())
                .unwrap_or_default()
        });
        let body = serde_json::json!({ "company": company });
        fetch_json(
            self.name(),
            &self.client,
            format!("{}/company/signals", self.base_url),
            &self.api_key,
            body,
        )
        .await
    }
}

/// Stage 3 — broad web search, the widest and noisiest net.
pub struct WebSearchStage {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl WebSearchStage {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl EvidenceStage for WebSearchStage {
    fn name(&self) -> &str {
        "web_search"
    }

    async fn fetch(&self, lead: &Lead) -> Result<Vec<Trigger>, ResearchError> {
        let query = match &lead.company_name {
            Some(company) => format!("{} {}", lead.display_name(), company),
            None => lead.display_name(),
        };
        let body = serde_json::json!({ "query": query, "scored": true });
        fetch_json(
            self.name(),
            &self.client,
            format!("{}/search", self.base_url),
            &self.api_key,
            body,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_triggers_convert_with_lenient_recency() {
        let wire = vec![
            WireTrigger {
                kind: "funding_round".into(),
                fact: "Raised a Series B".into(),
                recency: Some("last_month".into()),
                relevance_score: 5,
            },
            WireTrigger {
                kind: "hiring".into(),
                fact: "Hiring SDRs".into(),
                recency: None,
                relevance_score: 7, // out of range, clamped
            },
        ];
        let triggers = into_triggers(wire);
        assert_eq!(triggers[0].recency, RecencyBucket::LastMonth);
        assert_eq!(triggers[1].recency, RecencyBucket::Unknown);
        assert_eq!(triggers[1].relevance_score, 5);
    }
}
