//! Evidence types for the waterfall resolver.

use serde::{Deserialize, Serialize};

/// How fresh a piece of evidence is. Variant order is most-recent-first so
/// the derived `Ord` doubles as the recency tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecencyBucket {
    LastMonth,
    Last3Months,
    Last6Months,
    LastYear,
    Older,
    Unknown,
}

impl RecencyBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastMonth => "last_month",
            Self::Last3Months => "last_3_months",
            Self::Last6Months => "last_6_months",
            Self::LastYear => "last_year",
            Self::Older => "older",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a provider's free-form recency label, defaulting to `Unknown`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "last_month" | "this_month" => Self::LastMonth,
            "last_3_months" | "last_quarter" => Self::Last3Months,
            "last_6_months" => Self::Last6Months,
            "last_year" | "this_year" => Self::LastYear,
            "older" => Self::Older,
            _ => Self::Unknown,
        }
    }
}

/// One piece of evidence supporting an outreach angle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Evidence category, e.g. "job_change", "funding_round", "company_news".
    pub kind: String,
    /// The concrete fact, in one sentence.
    pub fact: String,
    pub recency: RecencyBucket,
    /// Relevance, 1 (weak) to 5 (strong). Clamped on construction.
    pub relevance_score: u8,
}

impl Trigger {
    pub fn new(
        kind: impl Into<String>,
        fact: impl Into<String>,
        recency: RecencyBucket,
        relevance_score: u8,
    ) -> Self {
        Self {
            kind: kind.into(),
            fact: fact.into(),
            recency,
            relevance_score: relevance_score.clamp(1, 5),
        }
    }
}

/// Sort triggers by score descending, most recent first within a score.
pub fn sort_triggers(triggers: &mut [Trigger]) {
    triggers.sort_by(|a, b| {
        b.relevance_score
            .cmp(&a.relevance_score)
            .then(a.recency.cmp(&b.recency))
    });
}

/// The early-stop heuristic: do the accumulated triggers justify halting?
///
/// Sufficient if any of:
/// - at least 2 triggers with score >= 4
/// - at least 1 trigger with score 5 and recency within the last 3 months
/// - at least 3 triggers with score >= 3
pub fn is_sufficient(triggers: &[Trigger]) -> bool {
    let strong = triggers.iter().filter(|t| t.relevance_score >= 4).count();
    if strong >= 2 {
        return true;
    }

    let fresh_top = triggers.iter().any(|t| {
        t.relevance_score == 5
            && matches!(t.recency, RecencyBucket::LastMonth | RecencyBucket::Last3Months)
    });
    if fresh_top {
        return true;
    }

    triggers.iter().filter(|t| t.relevance_score >= 3).count() >= 3
}
