//! Sequence model — the generated content plan for one lead.
//!
//! A sequence is immutable once created; orchestration state references it
//! by id and tracks progress through its steps per channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::Channel;

/// A cross-channel signal that can swap a not-yet-sent step body for a
/// conditional variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossSignal {
    /// The LinkedIn connection was accepted.
    Connected,
    /// The lead replied on LinkedIn.
    Replied,
}

impl CrossSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Replied => "replied",
        }
    }
}

/// Gate that must hold before a step may be sent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPrecondition {
    /// LinkedIn connection must already be accepted (LinkedIn steps).
    RequiresConnection,
    /// Email step holds for a LinkedIn connection, up to a deadline.
    WaitForLinkedin { timeout_hours: i64 },
}

/// Body variants keyed by cross-channel signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionalBodies {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replied: Option<String>,
}

impl ConditionalBodies {
    pub fn for_signal(&self, signal: CrossSignal) -> Option<&str> {
        match signal {
            CrossSignal::Connected => self.connected.as_deref(),
            CrossSignal::Replied => self.replied.as_deref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.connected.is_none() && self.replied.is_none()
    }
}

/// One step of a channel's plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    /// Unique per channel, ascending.
    pub step_number: u32,
    /// Days after sequence start this step becomes due.
    pub day_offset: i64,
    /// Subject line; email steps only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    #[serde(default)]
    pub conditional_bodies: ConditionalBodies,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precondition: Option<StepPrecondition>,
    /// Email steps may trigger a specific LinkedIn step once they commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_linkedin: Option<u32>,
}

impl SequenceStep {
    pub fn new(step_number: u32, day_offset: i64, body: impl Into<String>) -> Self {
        Self {
            step_number,
            day_offset,
            subject: None,
            body: body.into(),
            conditional_bodies: ConditionalBodies::default(),
            precondition: None,
            trigger_linkedin: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_precondition(mut self, precondition: StepPrecondition) -> Self {
        self.precondition = Some(precondition);
        self
    }

    pub fn with_conditional_body(mut self, signal: CrossSignal, body: impl Into<String>) -> Self {
        match signal {
            CrossSignal::Connected => self.conditional_bodies.connected = Some(body.into()),
            CrossSignal::Replied => self.conditional_bodies.replied = Some(body.into()),
        }
        self
    }

    pub fn with_trigger_linkedin(mut self, step_number: u32) -> Self {
        self.trigger_linkedin = Some(step_number);
        self
    }

    /// The body to send given the latest cross-channel signal, if any.
    pub fn body_for(&self, signal: Option<CrossSignal>) -> &str {
        signal
            .and_then(|s| self.conditional_bodies.for_signal(s))
            .unwrap_or(&self.body)
    }
}

/// The full two-channel plan for one lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email_steps: Vec<SequenceStep>,
    pub linkedin_steps: Vec<SequenceStep>,
    pub created_at: DateTime<Utc>,
}

impl Sequence {
    pub fn new(
        tenant_id: Uuid,
        email_steps: Vec<SequenceStep>,
        linkedin_steps: Vec<SequenceStep>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            email_steps,
            linkedin_steps,
            created_at: Utc::now(),
        }
    }

    pub fn steps(&self, channel: Channel) -> &[SequenceStep] {
        match channel {
            Channel::Email => &self.email_steps,
            Channel::Linkedin => &self.linkedin_steps,
        }
    }

    /// First step past the channel's current pointer, if any.
    pub fn next_step(&self, channel: Channel, current: u32) -> Option<&SequenceStep> {
        self.steps(channel)
            .iter()
            .filter(|s| s.step_number > current)
            .min_by_key(|s| s.step_number)
    }

    /// Look up a specific step on a channel.
    pub fn step(&self, channel: Channel, step_number: u32) -> Option<&SequenceStep> {
        self.steps(channel)
            .iter()
            .find(|s| s.step_number == step_number)
    }

    /// Smallest `day_offset` among steps not yet executed on either channel.
    pub fn min_unexecuted_day_offset(
        &self,
        email_current: u32,
        linkedin_current: u32,
    ) -> Option<i64> {
        let email = self
            .email_steps
            .iter()
            .filter(|s| s.step_number > email_current)
            .map(|s| s.day_offset);
        let linkedin = self
            .linkedin_steps
            .iter()
            .filter(|s| s.step_number > linkedin_current)
            .map(|s| s.day_offset);
        email.chain(linkedin).min()
    }

    /// Any not-yet-sent step on `channel` carrying a conditional body for
    /// `signal`? Drives the cross-channel copy-sync rule.
    pub fn has_pending_conditional(
        &self,
        channel: Channel,
        current: u32,
        signal: CrossSignal,
    ) -> bool {
        self.steps(channel)
            .iter()
            .any(|s| s.step_number > current && s.conditional_bodies.for_signal(signal).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence() -> Sequence {
        Sequence::new(
            Uuid::new_v4(),
            vec![
                SequenceStep::new(1, 0, "intro"),
                SequenceStep::new(2, 3, "bump")
                    .with_conditional_body(CrossSignal::Connected, "bump, now connected"),
                SequenceStep::new(3, 7, "breakup"),
            ],
            vec![
                SequenceStep::new(1, 0, "connection note"),
                SequenceStep::new(2, 2, "thanks for connecting")
                    .with_precondition(StepPrecondition::RequiresConnection),
            ],
        )
    }

    #[test]
    fn next_step_skips_executed() {
        let seq = sequence();
        assert_eq!(seq.next_step(Channel::Email, 0).unwrap().step_number, 1);
        assert_eq!(seq.next_step(Channel::Email, 1).unwrap().step_number, 2);
        assert!(seq.next_step(Channel::Email, 3).is_none());
    }

    #[test]
    fn min_unexecuted_day_offset_spans_channels() {
        let seq = sequence();
        assert_eq!(seq.min_unexecuted_day_offset(0, 0), Some(0));
        assert_eq!(seq.min_unexecuted_day_offset(1, 1), Some(2));
        assert_eq!(seq.min_unexecuted_day_offset(2, 2), Some(7));
        assert_eq!(seq.min_unexecuted_day_offset(3, 2), None);
    }

    #[test]
    fn conditional_body_substitution() {
        let seq = sequence();
        let step = seq.step(Channel::Email, 2).unwrap();
        assert_eq!(step.body_for(None), "bump");
        assert_eq!(step.body_for(Some(CrossSignal::Connected)), "bump, now connected");
        // No replied variant on this step — falls back to the default body.
        assert_eq!(step.body_for(Some(CrossSignal::Replied)), "bump");
    }

    #[test]
    fn pending_conditional_respects_pointer() {
        let seq = sequence();
        assert!(seq.has_pending_conditional(Channel::Email, 1, CrossSignal::Connected));
        // Step 2 already sent — nothing pending carries the variant.
        assert!(!seq.has_pending_conditional(Channel::Email, 2, CrossSignal::Connected));
        assert!(!seq.has_pending_conditional(Channel::Email, 1, CrossSignal::Replied));
    }
}
