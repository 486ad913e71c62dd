//! Lead model — identity, pipeline status, sentiment.
//!
//! Leads are never deleted, only status-transitioned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Ingested, not yet researched.
    New,
    /// Waterfall evidence resolution in progress.
    Researching,
    /// Sequence generated and deployed.
    Sequenced,
    /// At least one step has gone out.
    Engaged,
    /// Classified as interested — a human has taken over.
    Interested,
    /// Not now — parked for a scheduled follow-up.
    Nurture,
    /// Asked to be removed.
    Unsubscribed,
    /// Hard bounce on the email channel.
    Bounced,
    Converted,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Researching => "researching",
            Self::Sequenced => "sequenced",
            Self::Engaged => "engaged",
            Self::Interested => "interested",
            Self::Nurture => "nurture",
            Self::Unsubscribed => "unsubscribed",
            Self::Bounced => "bounced",
            Self::Converted => "converted",
        }
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "researching" => Ok(Self::Researching),
            "sequenced" => Ok(Self::Sequenced),
            "engaged" => Ok(Self::Engaged),
            "interested" => Ok(Self::Interested),
            "nurture" => Ok(Self::Nurture),
            "unsubscribed" => Ok(Self::Unsubscribed),
            "bounced" => Ok(Self::Bounced),
            "converted" => Ok(Self::Converted),
            other => Err(format!("unknown lead status: {other}")),
        }
    }
}

/// Sentiment tag, refreshed on every reply classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    #[default]
    Neutral,
    Positive,
    Negative,
    OutOfOffice,
    Removed,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::OutOfOffice => "out_of_office",
            Self::Removed => "removed",
        }
    }
}

impl std::str::FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "neutral" => Ok(Self::Neutral),
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            "out_of_office" => Ok(Self::OutOfOffice),
            "removed" => Ok(Self::Removed),
            other => Err(format!("unknown sentiment: {other}")),
        }
    }
}

/// A prospective contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    /// Professional-network profile URL, when known.
    pub linkedin_url: Option<String>,
    pub status: LeadStatus,
    pub sentiment: Sentiment,
    /// Provider-side lead id on the email channel.
    pub smartlead_lead_id: Option<String>,
    /// Provider-side lead id on the LinkedIn channel.
    pub heyreach_lead_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(tenant_id: Uuid, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            email: email.into(),
            first_name: None,
            last_name: None,
            company_name: None,
            linkedin_url: None,
            status: LeadStatus::New,
            sentiment: Sentiment::Neutral,
            smartlead_lead_id: None,
            heyreach_lead_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Display name for prompts and alerts.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => format!("{f} {l}"),
            (Some(f), None) => f.clone(),
            (None, Some(l)) => l.clone(),
            (None, None) => self.email.clone(),
        }
    }
}
