//! Deterministic routing of classified replies.
//!
//! The classifier decides *what* a reply is; this module decides *what
//! happens*, with no model in the loop: follow-up dates, suppression,
//! pauses, alerts. Every category updates lead sentiment and produces
//! exactly one audit entry — a classification is never silently dropped.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use regex::Regex;
use tracing::debug;

use crate::leads::{Lead, LeadStatus, Sentiment};
use crate::orchestrator::machine::Action;
use crate::orchestrator::state::StopReason;
use crate::reply::model::{CategoryFields, FollowUpRecord, ReplyClassification};

/// Everything the engine must apply for one classified reply.
#[derive(Debug, Clone)]
pub struct RoutingOutcome {
    pub classification: ReplyClassification,
    pub actions: Vec<Action>,
    pub sentiment: Sentiment,
    /// New pipeline status, when the category changes it.
    pub lead_status: Option<LeadStatus>,
    pub follow_up: Option<FollowUpRecord>,
    /// Email to add to the suppression set.
    pub suppress_email: Option<String>,
    /// Notify the downstream CRM sync collaborator.
    pub downstream_sync: bool,
    /// Flag for the manual-review queue.
    pub needs_manual_review: bool,
}

/// Route one classification to its deterministic handling.
pub fn route(
    classification: ReplyClassification,
    lead: &Lead,
    original_reply: &str,
    now: DateTime<Utc>,
    default_follow_up_days: i64,
) -> RoutingOutcome {
    let mut actions = Vec::new();
    let mut lead_status = None;
    let mut follow_up = None;
    let mut suppress_email = None;
    let mut downstream_sync = false;
    let mut needs_manual_review = false;

    let sentiment = match &classification.fields {
        CategoryFields::OutOfOffice { return_date } => {
            // Restart the day after they're back; unknown return dates fall
            // back to the default follow-up horizon.
            let restart = return_date
                .map(|d| d + Duration::days(1))
                .unwrap_or_else(|| now.date_naive() + Duration::days(default_follow_up_days));
            actions.push(Action::PauseChannel {
                channel: crate::events::Channel::Email,
            });
            actions.push(Action::ScheduleResume {
                at: restart
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is always valid")
                    .and_utc(),
            });
            Sentiment::OutOfOffice
        }

        CategoryFields::NotInterestedNow {
            follow_up_suggestion,
            reason,
        } => {
            let date = follow_up_suggestion
                .as_deref()
                .and_then(|s| parse_follow_up_suggestion(s, now.date_naive()))
                .unwrap_or_else(|| now.date_naive() + Duration::days(default_follow_up_days));
            debug!(lead_id = %lead.id, follow_up = %date, "Parked not-interested-now lead");

            follow_up = Some(FollowUpRecord::new(
                lead.id,
                "not_interested_now",
                original_reply,
                date,
                reason.clone(),
            ));
            lead_status = Some(LeadStatus::Nurture);
            actions.push(Action::Stop {
                reason: StopReason::NotInterested,
            });
            Sentiment::Negative
        }

        CategoryFields::RemoveMe => {
            actions.push(Action::Stop {
                reason: StopReason::Unsubscribe,
            });
            suppress_email = Some(lead.email.clone());
            downstream_sync = true;
            lead_status = Some(LeadStatus::Unsubscribed);
            Sentiment::Removed
        }

        CategoryFields::Interested {
            interest_level,
            signals,
        } => {
            // A human takes over; sequencing itself is not stopped here.
            actions.push(Action::Alert {
                interest_level: interest_level.clone(),
                signals: signals.clone(),
            });
            lead_status = Some(LeadStatus::Interested);
            Sentiment::Positive
        }

        CategoryFields::Other => {
            needs_manual_review = true;
            Sentiment::Neutral
        }
    };

    RoutingOutcome {
        classification,
        actions,
        sentiment,
        lead_status,
        follow_up,
        suppress_email,
        downstream_sync,
        needs_manual_review,
    }
}

/// Parse a follow-up suggestion into a concrete date.
///
/// Understands quarter names (`Q2`/`Q3`/`Q4` → the next Apr 1 / Jul 1 /
/// Oct 1) and `"N month(s)"`. Anything else returns `None` and the caller
/// applies the default horizon.
pub fn parse_follow_up_suggestion(suggestion: &str, today: NaiveDate) -> Option<NaiveDate> {
    let quarter_re = Regex::new(r"(?i)\bQ([234])\b").expect("static regex");
    if let Some(caps) = quarter_re.captures(suggestion) {
        let quarter: u32 = caps[1].parse().ok()?;
        return Some(next_quarter_anchor(quarter, today));
    }

    let months_re = Regex::new(r"(?i)\b(\d{1,2})\s*months?\b").expect("static regex");
    if let Some(caps) = months_re.captures(suggestion) {
        let n: u32 = caps[1].parse().ok()?;
        return today.checked_add_months(Months::new(n));
    }

    None
}

/// The fixed calendar anchor for a quarter, rolled to next year when the
/// anchor has already passed.
fn next_quarter_anchor(quarter: u32, today: NaiveDate) -> NaiveDate {
    let month = match quarter {
        2 => 4,
        3 => 7,
        _ => 10,
    };
    let this_year =
        NaiveDate::from_ymd_opt(today.year(), month, 1).expect("first of month is valid");
    if this_year > today {
        this_year
    } else {
        NaiveDate::from_ymd_opt(today.year() + 1, month, 1).expect("first of month is valid")
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::events::Channel;
    use crate::reply::model::ReplyCategory;

    fn lead() -> Lead {
        Lead::new(Uuid::new_v4(), "jane@acme.io")
    }

    fn classification(fields: CategoryFields) -> ReplyClassification {
        ReplyClassification::new(Uuid::new_v4(), 0.9, "test", fields)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn ooo_schedules_resume_the_day_after_return() {
        let now = date(2025, 2, 20).and_hms_opt(9, 0, 0).unwrap().and_utc();
        let outcome = route(
            classification(CategoryFields::OutOfOffice {
                return_date: Some(date(2025, 3, 10)),
            }),
            &lead(),
            "back in office March 10",
            now,
            90,
        );

        assert_eq!(outcome.sentiment, Sentiment::OutOfOffice);
        assert!(outcome.actions.contains(&Action::PauseChannel {
            channel: Channel::Email
        }));
        let resume_at = outcome
            .actions
            .iter()
            .find_map(|a| match a {
                Action::ScheduleResume { at } => Some(*at),
                _ => None,
            })
            .expect("resume scheduled");
        assert_eq!(resume_at.date_naive(), date(2025, 3, 11));
    }

    #[test]
    fn ooo_without_date_uses_default_horizon() {
        let now = date(2025, 2, 20).and_hms_opt(9, 0, 0).unwrap().and_utc();
        let outcome = route(
            classification(CategoryFields::OutOfOffice { return_date: None }),
            &lead(),
            "I am away",
            now,
            90,
        );
        let resume_at = outcome
            .actions
            .iter()
            .find_map(|a| match a {
                Action::ScheduleResume { at } => Some(*at),
                _ => None,
            })
            .unwrap();
        assert_eq!(resume_at.date_naive(), date(2025, 5, 21));
    }

    #[test]
    fn not_interested_quarter_parses_to_anchor() {
        let now = date(2025, 2, 20).and_hms_opt(9, 0, 0).unwrap().and_utc();
        let outcome = route(
            classification(CategoryFields::NotInterestedNow {
                follow_up_suggestion: Some("try me again in Q3".into()),
                reason: Some("budget frozen".into()),
            }),
            &lead(),
            "not now, try me again in Q3",
            now,
            90,
        );

        let follow_up = outcome.follow_up.expect("follow-up record");
        assert_eq!(follow_up.follow_up_date, date(2025, 7, 1));
        assert_eq!(follow_up.notes.as_deref(), Some("budget frozen"));
        assert_eq!(outcome.lead_status, Some(LeadStatus::Nurture));
        assert!(outcome.actions.contains(&Action::Stop {
            reason: StopReason::NotInterested
        }));
    }

    #[test]
    fn quarter_already_past_rolls_to_next_year() {
        assert_eq!(
            parse_follow_up_suggestion("Q2", date(2025, 6, 15)),
            Some(date(2026, 4, 1))
        );
        assert_eq!(
            parse_follow_up_suggestion("q4", date(2025, 2, 1)),
            Some(date(2025, 10, 1))
        );
    }

    #[test]
    fn n_months_parses() {
        assert_eq!(
            parse_follow_up_suggestion("in 2 months", date(2025, 1, 31)),
            Some(date(2025, 3, 31))
        );
        assert_eq!(
            parse_follow_up_suggestion("1 month", date(2025, 1, 15)),
            Some(date(2025, 2, 15))
        );
    }

    #[test]
    fn unparseable_suggestion_defaults_to_90_days() {
        let now = date(2025, 1, 1).and_hms_opt(0, 0, 0).unwrap().and_utc();
        let outcome = route(
            classification(CategoryFields::NotInterestedNow {
                follow_up_suggestion: Some("when pigs fly".into()),
                reason: None,
            }),
            &lead(),
            "when pigs fly",
            now,
            90,
        );
        assert_eq!(
            outcome.follow_up.unwrap().follow_up_date,
            date(2025, 4, 1)
        );
    }

    #[test]
    fn remove_me_stops_and_suppresses() {
        let the_lead = lead();
        let outcome = route(
            classification(CategoryFields::RemoveMe),
            &the_lead,
            "remove me from your list",
            Utc::now(),
            90,
        );

        assert!(outcome.actions.contains(&Action::Stop {
            reason: StopReason::Unsubscribe
        }));
        assert_eq!(outcome.suppress_email.as_deref(), Some(the_lead.email.as_str()));
        assert!(outcome.downstream_sync);
        assert_eq!(outcome.sentiment, Sentiment::Removed);
        assert_eq!(outcome.lead_status, Some(LeadStatus::Unsubscribed));
    }

    #[test]
    fn interested_alerts_without_stopping() {
        let outcome = route(
            classification(CategoryFields::Interested {
                interest_level: "high".into(),
                signals: vec!["asked for pricing".into()],
            }),
            &lead(),
            "what does this cost?",
            Utc::now(),
            90,
        );

        assert!(matches!(outcome.actions[0], Action::Alert { .. }));
        assert!(!outcome
            .actions
            .iter()
            .any(|a| matches!(a, Action::Stop { .. } | Action::PauseChannel { .. })));
        assert_eq!(outcome.lead_status, Some(LeadStatus::Interested));
        assert_eq!(outcome.sentiment, Sentiment::Positive);
    }

    #[test]
    fn other_goes_to_manual_review_only() {
        let outcome = route(
            classification(CategoryFields::Other),
            &lead(),
            "👍",
            Utc::now(),
            90,
        );
        assert!(outcome.actions.is_empty());
        assert!(outcome.needs_manual_review);
        assert!(outcome.lead_status.is_none());
        assert_eq!(outcome.classification.category(), ReplyCategory::Other);
    }
}
