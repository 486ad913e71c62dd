//! Durable per-lead orchestration state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sequence::CrossSignal;

/// Whole-lead orchestration status.
///
/// `paused` is deliberately absent: pausing is an orthogonal per-channel
/// flag on the state record, not a lead-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    /// Deployed, first tick not yet run.
    Pending,
    /// Sequencing in progress.
    Active,
    /// Suspended on a wait condition with a deadline.
    Waiting,
    /// Permanently stopped (bounce, unsubscribe, not-interested).
    Stopped,
    /// Both channels ran out of steps.
    Completed,
    /// Handed to a human and won.
    Converted,
}

impl OrchestrationStatus {
    /// Declared adjacency. Terminal states admit nothing.
    pub fn can_transition_to(&self, target: OrchestrationStatus) -> bool {
        use OrchestrationStatus::*;

        matches!(
            (self, target),
            (Pending, Active) | (Pending, Stopped) |
            (Active, Waiting) | (Active, Stopped) | (Active, Completed) | (Active, Converted) |
            (Waiting, Active) | (Waiting, Stopped) | (Waiting, Converted)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Converted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Waiting => "waiting",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Converted => "converted",
        }
    }
}

impl std::fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrchestrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "waiting" => Ok(Self::Waiting),
            "stopped" => Ok(Self::Stopped),
            "completed" => Ok(Self::Completed),
            "converted" => Ok(Self::Converted),
            other => Err(format!("unknown orchestration status: {other}")),
        }
    }
}

/// What a waiting lead is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitingFor {
    LinkedinConnection,
}

impl WaitingFor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinkedinConnection => "linkedin_connection",
        }
    }
}

/// Why sequencing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Bounce,
    Unsubscribe,
    NotInterested,
    Manual,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bounce => "bounce",
            Self::Unsubscribe => "unsubscribe",
            Self::NotInterested => "not_interested",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for StopReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bounce" => Ok(Self::Bounce),
            "unsubscribe" => Ok(Self::Unsubscribe),
            "not_interested" => Ok(Self::NotInterested),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown stop reason: {other}")),
        }
    }
}

/// The one active orchestration record per lead.
///
/// Invariants, enforced by the mutators below and checked in tests:
/// - `waiting_timeout_at`/`waiting_for`/`waiting_since` are set iff
///   `status == Waiting`;
/// - step pointers are monotonic and advance only on an executed send;
/// - terminal states are final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationState {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub tenant_id: Uuid,
    pub sequence_id: Uuid,
    pub status: OrchestrationStatus,
    /// Highest step number sent per channel; 0 = nothing sent.
    pub email_step_current: u32,
    pub linkedin_step_current: u32,
    pub email_paused: bool,
    pub linkedin_paused: bool,
    pub email_completed: bool,
    pub linkedin_completed: bool,
    pub linkedin_connected: bool,
    /// Set when a forced timeout resume fired, so `wait_for_linkedin`
    /// preconditions stop blocking email steps.
    pub linkedin_wait_expired: bool,
    /// Latest cross-channel signal; not-yet-sent steps render the matching
    /// conditional body variant when one exists.
    pub cross_signal: Option<CrossSignal>,
    pub waiting_for: Option<WaitingFor>,
    pub waiting_since: Option<DateTime<Utc>>,
    pub waiting_timeout_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
    pub smartlead_lead_id: Option<String>,
    pub heyreach_lead_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrchestrationState {
    pub fn new(lead_id: Uuid, tenant_id: Uuid, sequence_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            lead_id,
            tenant_id,
            sequence_id,
            status: OrchestrationStatus::Pending,
            email_step_current: 0,
            linkedin_step_current: 0,
            email_paused: false,
            linkedin_paused: false,
            email_completed: false,
            linkedin_completed: false,
            linkedin_connected: false,
            linkedin_wait_expired: false,
            cross_signal: None,
            waiting_for: None,
            waiting_since: None,
            waiting_timeout_at: None,
            stop_reason: None,
            smartlead_lead_id: None,
            heyreach_lead_id: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition to `target`, rejecting anything off the declared adjacency.
    pub fn transition_to(&mut self, target: OrchestrationStatus) -> Result<(), String> {
        if self.status == target {
            return Ok(());
        }
        if !self.status.can_transition_to(target) {
            return Err(format!("cannot transition {} -> {}", self.status, target));
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Enter `waiting` with a deadline. Keeps the waiting-field invariant.
    pub fn enter_waiting(&mut self, waiting_for: WaitingFor, now: DateTime<Utc>, timeout_hours: i64) {
        self.status = OrchestrationStatus::Waiting;
        self.waiting_for = Some(waiting_for);
        self.waiting_since = Some(now);
        self.waiting_timeout_at = Some(now + Duration::hours(timeout_hours));
        self.updated_at = now;
    }

    /// Leave `waiting` and return to `active`, clearing all waiting fields.
    pub fn clear_waiting(&mut self) {
        self.status = OrchestrationStatus::Active;
        self.waiting_for = None;
        self.waiting_since = None;
        self.waiting_timeout_at = None;
        self.updated_at = Utc::now();
    }

    /// Stop permanently with a reason. Waiting fields are cleared so the
    /// waiting invariant holds in the terminal state too.
    pub fn stop(&mut self, reason: StopReason) {
        self.status = OrchestrationStatus::Stopped;
        self.stop_reason = Some(reason);
        self.waiting_for = None;
        self.waiting_since = None;
        self.waiting_timeout_at = None;
        self.updated_at = Utc::now();
    }

    /// Advance a channel pointer after a send committed. Monotonic only.
    pub fn advance_step(&mut self, channel: crate::events::Channel, step_number: u32) {
        let current = match channel {
            crate::events::Channel::Email => &mut self.email_step_current,
            crate::events::Channel::Linkedin => &mut self.linkedin_step_current,
        };
        if step_number > *current {
            *current = step_number;
            self.updated_at = Utc::now();
        }
    }

    pub fn step_current(&self, channel: crate::events::Channel) -> u32 {
        match channel {
            crate::events::Channel::Email => self.email_step_current,
            crate::events::Channel::Linkedin => self.linkedin_step_current,
        }
    }

    pub fn channel_paused(&self, channel: crate::events::Channel) -> bool {
        match channel {
            crate::events::Channel::Email => self.email_paused,
            crate::events::Channel::Linkedin => self.linkedin_paused,
        }
    }

    pub fn channel_completed(&self, channel: crate::events::Channel) -> bool {
        match channel {
            crate::events::Channel::Email => self.email_completed,
            crate::events::Channel::Linkedin => self.linkedin_completed,
        }
    }

    pub fn set_channel_completed(&mut self, channel: crate::events::Channel) {
        match channel {
            crate::events::Channel::Email => self.email_completed = true,
            crate::events::Channel::Linkedin => self.linkedin_completed = true,
        }
        self.updated_at = Utc::now();
    }

    pub fn set_channel_paused(&mut self, channel: crate::events::Channel, paused: bool) {
        match channel {
            crate::events::Channel::Email => self.email_paused = paused,
            crate::events::Channel::Linkedin => self.linkedin_paused = paused,
        }
        self.updated_at = Utc::now();
    }

    /// Record a cross-channel signal for conditional-body rendering.
    /// `Replied` is the stronger signal and is never downgraded.
    pub fn set_cross_signal(&mut self, signal: CrossSignal) {
        if self.cross_signal != Some(CrossSignal::Replied) {
            self.cross_signal = Some(signal);
            self.updated_at = Utc::now();
        }
    }

    /// Whole days elapsed since the sequence started.
    pub fn elapsed_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_days().max(0)
    }
}
