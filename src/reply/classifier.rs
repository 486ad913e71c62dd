//! LLM-backed reply classification.
//!
//! The model call does categorization only; everything the business acts on
//! (dates, follow-ups, suppression) is deterministic post-processing in the
//! router. Model output that fails the schema is coerced to
//! `other`/confidence 0 — a classification is never an error.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::ClassifierError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::reply::model::{CategoryFields, ReplyClassification};

/// Max tokens for the classification call (runs on every reply, kept tight).
const CLASSIFY_MAX_TOKENS: u64 = 512;

/// Near-deterministic temperature.
const CLASSIFY_TEMPERATURE: f64 = 0.1;

/// What the classifier gets to look at.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    /// Id of the stored raw reply.
    pub response_id: Uuid,
    pub reply_text: String,
    pub subject: Option<String>,
    pub lead_name: String,
    pub company_name: Option<String>,
}

/// The classification seam, stubbed in tests.
#[async_trait]
pub trait ReplyClassifier: Send + Sync {
    async fn classify(
        &self,
        request: &ClassifyRequest,
    ) -> Result<ReplyClassification, ClassifierError>;
}

/// Production classifier over an [`LlmProvider`].
pub struct LlmReplyClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl LlmReplyClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ReplyClassifier for LlmReplyClassifier {
    async fn classify(
        &self,
        request: &ClassifyRequest,
    ) -> Result<ReplyClassification, ClassifierError> {
        let completion = CompletionRequest::new(vec![
            ChatMessage::system(CLASSIFY_SYSTEM_PROMPT),
            ChatMessage::user(build_user_prompt(request)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        // Transport failures propagate (the durable runtime retries those);
        // schema failures never do.
        let response = self.llm.complete(completion).await?;
        Ok(parse_classification(request.response_id, &response.content))
    }
}

const CLASSIFY_SYSTEM_PROMPT: &str = r#"You classify inbound replies to sales outreach. Respond with ONLY a JSON object, no prose:
{
  "category": "out_of_office" | "not_interested_now" | "remove_me" | "interested" | "other",
  "confidence": 0.0-1.0,
  "reasoning": "one sentence",
  "ooo_return_date": "YYYY-MM-DD",          // out_of_office only, omit if unknown
  "follow_up_suggestion": "Q3" | "2 months", // not_interested_now only, verbatim from the reply
  "not_interested_reason": "...",            // not_interested_now only
  "interest_level": "low" | "medium" | "high", // interested only
  "interest_signals": ["..."]                // interested only
}
Category guide:
- out_of_office: autoresponder or explicit absence with/without a return date
- not_interested_now: a soft no with timing ("not now", "try next quarter")
- remove_me: unsubscribe/stop/opt-out requests, hostile or not
- interested: any buying signal, question about the product, or meeting ask
- other: everything else, including ambiguous one-liners"#;

fn build_user_prompt(request: &ClassifyRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("Lead: {}\n", request.lead_name));
    if let Some(ref company) = request.company_name {
        prompt.push_str(&format!("Company: {company}\n"));
    }
    if let Some(ref subject) = request.subject {
        prompt.push_str(&format!("Subject: {subject}\n"));
    }
    prompt.push_str(&format!("\nReply:\n{}", request.reply_text));
    prompt
}

/// Wire shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct WireClassification {
    category: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    ooo_return_date: Option<NaiveDate>,
    #[serde(default)]
    follow_up_suggestion: Option<String>,
    #[serde(default)]
    not_interested_reason: Option<String>,
    #[serde(default)]
    interest_level: Option<String>,
    #[serde(default)]
    interest_signals: Vec<String>,
}

/// Parse model output into a classification, falling back to `other`/0.0 on
/// any schema violation.
pub fn parse_classification(response_id: Uuid, raw: &str) -> ReplyClassification {
    let cleaned = strip_code_fences(raw);

    let wire: WireClassification = match serde_json::from_str(cleaned) {
        Ok(w) => w,
        Err(e) => {
            warn!(error = %e, raw, "Classifier output failed schema, coercing to other");
            return ReplyClassification::fallback_other(
                response_id,
                format!("unparseable model output: {e}"),
            );
        }
    };

    let fields = match wire.category.as_str() {
        "out_of_office" => CategoryFields::OutOfOffice {
            return_date: wire.ooo_return_date,
        },
        "not_interested_now" => CategoryFields::NotInterestedNow {
            follow_up_suggestion: wire.follow_up_suggestion,
            reason: wire.not_interested_reason,
        },
        "remove_me" => CategoryFields::RemoveMe,
        "interested" => CategoryFields::Interested {
            interest_level: wire.interest_level.unwrap_or_else(|| "medium".into()),
            signals: wire.interest_signals,
        },
        "other" => CategoryFields::Other,
        unknown => {
            warn!(category = unknown, "Classifier invented a category, coercing to other");
            return ReplyClassification::fallback_other(
                response_id,
                format!("unknown category: {unknown}"),
            );
        }
    };

    ReplyClassification::new(
        response_id,
        wire.confidence.clamp(0.0, 1.0),
        wire.reasoning,
        fields,
    )
}

/// Models love to wrap JSON in markdown fences; strip them.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::model::ReplyCategory;

    #[test]
    fn parses_out_of_office_with_date() {
        let raw = r#"{"category":"out_of_office","confidence":0.95,"reasoning":"autoresponder","ooo_return_date":"2025-03-10"}"#;
        let c = parse_classification(Uuid::new_v4(), raw);
        assert_eq!(c.category(), ReplyCategory::OutOfOffice);
        match c.fields {
            CategoryFields::OutOfOffice { return_date } => {
                assert_eq!(return_date, NaiveDate::from_ymd_opt(2025, 3, 10));
            }
            other => panic!("wrong fields: {other:?}"),
        }
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "```json\n{\"category\":\"remove_me\",\"confidence\":0.99,\"reasoning\":\"said stop\"}\n```";
        let c = parse_classification(Uuid::new_v4(), raw);
        assert_eq!(c.category(), ReplyCategory::RemoveMe);
    }

    #[test]
    fn garbage_coerces_to_other_zero_confidence() {
        let c = parse_classification(Uuid::new_v4(), "I think this is probably spam?");
        assert_eq!(c.category(), ReplyCategory::Other);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn unknown_category_coerces_to_other() {
        let raw = r#"{"category":"enthusiastic","confidence":0.8,"reasoning":"very keen"}"#;
        let c = parse_classification(Uuid::new_v4(), raw);
        assert_eq!(c.category(), ReplyCategory::Other);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn confidence_is_clamped() {
        let raw = r#"{"category":"interested","confidence":7.5,"reasoning":"","interest_level":"high"}"#;
        let c = parse_classification(Uuid::new_v4(), raw);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn interested_defaults_missing_level_to_medium() {
        let raw = r#"{"category":"interested","confidence":0.7,"reasoning":"asked a question"}"#;
        let c = parse_classification(Uuid::new_v4(), raw);
        match c.fields {
            CategoryFields::Interested { interest_level, .. } => {
                assert_eq!(interest_level, "medium");
            }
            other => panic!("wrong fields: {other:?}"),
        }
    }

    #[test]
    fn invalid_date_fails_schema_not_panics() {
        let raw = r#"{"category":"out_of_office","confidence":0.9,"reasoning":"x","ooo_return_date":"March 10th"}"#;
        let c = parse_classification(Uuid::new_v4(), raw);
        // Bad date fails the whole schema; the fallback still classifies.
        assert_eq!(c.category(), ReplyCategory::Other);
    }

    #[test]
    fn user_prompt_includes_context() {
        let request = ClassifyRequest {
            response_id: Uuid::new_v4(),
            reply_text: "not interested".into(),
            subject: Some("Re: intro".into()),
            lead_name: "Jane Doe".into(),
            company_name: Some("Acme".into()),
        };
        let prompt = build_user_prompt(&request);
        assert!(prompt.contains("Jane Doe"));
        assert!(prompt.contains("Acme"));
        assert!(prompt.contains("Re: intro"));
        assert!(prompt.contains("not interested"));
    }
}
