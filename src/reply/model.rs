//! Reply classification records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The five reply categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyCategory {
    OutOfOffice,
    NotInterestedNow,
    RemoveMe,
    Interested,
    Other,
}

impl ReplyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfOffice => "out_of_office",
            Self::NotInterestedNow => "not_interested_now",
            Self::RemoveMe => "remove_me",
            Self::Interested => "interested",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for ReplyCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "out_of_office" => Ok(Self::OutOfOffice),
            "not_interested_now" => Ok(Self::NotInterestedNow),
            "remove_me" => Ok(Self::RemoveMe),
            "interested" => Ok(Self::Interested),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown reply category: {other}")),
        }
    }
}

/// Category-specific structured fields pulled from the classifier output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum CategoryFields {
    OutOfOffice {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        return_date: Option<NaiveDate>,
    },
    NotInterestedNow {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        follow_up_suggestion: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    RemoveMe,
    Interested {
        interest_level: String,
        #[serde(default)]
        signals: Vec<String>,
    },
    Other,
}

impl CategoryFields {
    pub fn category(&self) -> ReplyCategory {
        match self {
            Self::OutOfOffice { .. } => ReplyCategory::OutOfOffice,
            Self::NotInterestedNow { .. } => ReplyCategory::NotInterestedNow,
            Self::RemoveMe => ReplyCategory::RemoveMe,
            Self::Interested { .. } => ReplyCategory::Interested,
            Self::Other => ReplyCategory::Other,
        }
    }
}

/// One immutable classification, attached 1:1 to the raw reply record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyClassification {
    pub id: Uuid,
    /// Id of the stored raw reply this classifies.
    pub response_id: Uuid,
    pub confidence: f32,
    pub reasoning: String,
    pub fields: CategoryFields,
    pub created_at: DateTime<Utc>,
}

impl ReplyClassification {
    pub fn new(
        response_id: Uuid,
        confidence: f32,
        reasoning: impl Into<String>,
        fields: CategoryFields,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            response_id,
            confidence,
            reasoning: reasoning.into(),
            fields,
            created_at: Utc::now(),
        }
    }

    /// The safety net for non-conforming model output.
    pub fn fallback_other(response_id: Uuid, reasoning: impl Into<String>) -> Self {
        Self::new(response_id, 0.0, reasoning, CategoryFields::Other)
    }

    pub fn category(&self) -> ReplyCategory {
        self.fields.category()
    }
}

/// A parked lead, to be picked up by the re-engagement scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpRecord {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub reason: String,
    pub original_reply: String,
    pub follow_up_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FollowUpRecord {
    pub fn new(
        lead_id: Uuid,
        reason: impl Into<String>,
        original_reply: impl Into<String>,
        follow_up_date: NaiveDate,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            reason: reason.into(),
            original_reply: original_reply.into(),
            follow_up_date,
            notes,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_carry_their_category() {
        assert_eq!(CategoryFields::RemoveMe.category(), ReplyCategory::RemoveMe);
        assert_eq!(
            CategoryFields::OutOfOffice { return_date: None }.category(),
            ReplyCategory::OutOfOffice
        );
    }

    #[test]
    fn fallback_is_other_with_zero_confidence() {
        let c = ReplyClassification::fallback_other(Uuid::new_v4(), "parse failed");
        assert_eq!(c.category(), ReplyCategory::Other);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn fields_serialize_tagged() {
        let fields = CategoryFields::Interested {
            interest_level: "high".into(),
            signals: vec!["asked for pricing".into()],
        };
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["category"], "interested");
        assert_eq!(json["interest_level"], "high");
    }
}
