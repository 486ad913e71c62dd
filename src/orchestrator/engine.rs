//! The engine shell — loads state, runs the pure machine, persists the
//! result, and executes actions against the collaborator seams.
//!
//! Per-lead writes are serialized by the compare-and-swap on the state
//! row's status; a concurrent writer gets a `StateConflict` and drops out.
//! The engine holds no mutable shared state of its own.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{BusEvent, EventBus};
use crate::channels::{ChannelSender, RenderedStep};
use crate::config::EngineConfig;
use crate::error::{DatabaseError, Error, OrchestrationError};
use crate::events::{Channel, EngineEvent};
use crate::leads::{Lead, LeadStatus};
use crate::orchestrator::machine::{self, Action, Schedule};
use crate::orchestrator::state::{OrchestrationState, OrchestrationStatus};
use crate::reply::classifier::{ClassifyRequest, ReplyClassifier};
use crate::reply::router;
use crate::sequence::Sequence;
use crate::store::Database;

/// Human-escalation seam.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// An interested reply came in; a human should take over.
    async fn interest(&self, lead: &Lead, level: &str, signals: &[String]);

    /// Something needs human eyes (failed classification, failed send).
    async fn failure(&self, lead: &Lead, reason: &str);
}

/// Collaborators the engine drives.
pub struct EngineDeps {
    pub store: Arc<dyn Database>,
    pub email: Arc<dyn ChannelSender>,
    pub linkedin: Arc<dyn ChannelSender>,
    pub classifier: Arc<dyn ReplyClassifier>,
    pub notifier: Arc<dyn Notifier>,
    pub bus: Arc<dyn EventBus>,
}

/// The orchestration engine.
pub struct Engine {
    config: EngineConfig,
    deps: EngineDeps,
}

impl Engine {
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Self {
        Self { config, deps }
    }

    pub fn store(&self) -> &Arc<dyn Database> {
        &self.deps.store
    }

    /// Deploy a sequence for a lead: create the one-and-only orchestration
    /// state and schedule the first tick.
    pub async fn deploy(&self, lead: &Lead, sequence: Sequence) -> Result<OrchestrationState, Error> {
        if self
            .deps
            .store
            .is_suppressed(lead.tenant_id, &lead.email)
            .await?
        {
            return Err(OrchestrationError::DeploymentFailed {
                lead_id: lead.id,
                reason: "email is on the suppression list".into(),
            }
            .into());
        }

        self.deps.store.insert_sequence(&sequence).await?;

        let mut state = OrchestrationState::new(lead.id, lead.tenant_id, sequence.id);
        state.smartlead_lead_id = lead.smartlead_lead_id.clone();
        state.heyreach_lead_id = lead.heyreach_lead_id.clone();

        match self.deps.store.insert_state(&state).await {
            Ok(()) => {}
            Err(DatabaseError::Constraint(_)) => {
                return Err(OrchestrationError::AlreadyDeployed { lead_id: lead.id }.into());
            }
            Err(e) => return Err(e.into()),
        }

        self.deps
            .store
            .update_lead_status(lead.id, LeadStatus::Sequenced)
            .await?;
        self.deps
            .store
            .append_audit(lead.id, &format!("sequence {} deployed", sequence.id))
            .await?;

        info!(lead_id = %lead.id, sequence_id = %sequence.id, "Sequence deployed");
        self.deps
            .bus
            .emit(BusEvent::Tick { lead_id: lead.id }, None)
            .await;
        Ok(state)
    }

    /// Entry point for the bus consumer loop.
    pub async fn handle_bus_event(&self, event: BusEvent) -> Result<(), Error> {
        match event {
            BusEvent::Tick { lead_id } => self.run_tick(lead_id).await,
            BusEvent::ResumeEmail { lead_id } => self.resume_email(lead_id).await,
            BusEvent::SuppressionSync { .. } => {
                // Consumed by the downstream CRM sync, not by the core.
                Ok(())
            }
        }
    }

    /// React to one inbound or internal event.
    pub async fn handle_event(&self, event: EngineEvent) -> Result<(), Error> {
        let lead_id = event.lead_id();
        let (lead, state, sequence) = self.load(lead_id).await?;

        if let EngineEvent::Canonical(ref canonical) = event {
            self.deps.store.append_event(canonical).await?;
            self.deps
                .store
                .append_audit(
                    lead_id,
                    &format!("event {} on {}", canonical.kind(), canonical.channel),
                )
                .await?;
        }

        let expected = state.status;
        let transition = machine::process_event(&state, &sequence, &event);
        self.persist(&transition.state, expected).await?;

        self.apply_actions(&lead, &sequence, transition.state, transition.actions)
            .await
    }

    /// Advance step execution for a lead. No-op on terminal leads.
    pub async fn run_tick(&self, lead_id: Uuid) -> Result<(), Error> {
        let (lead, state, sequence) = self.load(lead_id).await?;

        // Cancellation check at the top of every tick.
        if state.is_terminal() {
            debug!(lead_id = %lead_id, status = %state.status, "Tick on terminal lead ignored");
            return Ok(());
        }

        let expected = state.status;
        let outcome = machine::tick(
            &state,
            &sequence,
            Utc::now(),
            self.config.default_linkedin_wait_hours,
        );
        self.persist(&outcome.state, expected).await?;

        let schedule = outcome.schedule;
        self.apply_actions(&lead, &sequence, outcome.state, outcome.actions)
            .await?;

        match schedule {
            Schedule::After { days: 0 } => {
                self.deps.bus.emit(BusEvent::Tick { lead_id }, None).await;
            }
            Schedule::After { days } => {
                let delay = Duration::from_secs(days as u64 * 24 * 60 * 60);
                self.deps
                    .bus
                    .emit(BusEvent::Tick { lead_id }, Some(delay))
                    .await;
            }
            // Waiting leads are resumed by a connection event or the sweep;
            // idle/terminal leads by resume events or not at all.
            Schedule::Suspended | Schedule::Idle | Schedule::Done => {}
        }
        Ok(())
    }

    /// Unpause the email channel and re-tick (OOO restart, forced resume).
    pub async fn resume_email(&self, lead_id: Uuid) -> Result<(), Error> {
        let (_, mut state, _) = self.load(lead_id).await?;
        if state.is_terminal() {
            return Ok(());
        }

        if state.email_paused {
            let expected = state.status;
            state.set_channel_paused(Channel::Email, false);
            self.persist(&state, expected).await?;
            self.deps
                .store
                .append_audit(lead_id, "email channel resumed")
                .await?;
        }
        self.run_tick(lead_id).await
    }

    /// Move an interested lead to `converted`. Guarded: only a lead a human
    /// was alerted about (status `interested`) can convert.
    pub async fn mark_converted(&self, lead_id: Uuid) -> Result<(), Error> {
        let (lead, mut state, _) = self.load(lead_id).await?;

        if lead.status != LeadStatus::Interested {
            return Err(OrchestrationError::InvalidTransition {
                lead_id,
                from: state.status.to_string(),
                to: "converted".into(),
            }
            .into());
        }

        let expected = state.status;
        state
            .transition_to(OrchestrationStatus::Converted)
            .map_err(|_| OrchestrationError::InvalidTransition {
                lead_id,
                from: expected.to_string(),
                to: "converted".into(),
            })?;
        self.persist(&state, expected).await?;
        self.deps
            .store
            .update_lead_status(lead_id, LeadStatus::Converted)
            .await?;
        self.deps.store.append_audit(lead_id, "lead converted").await?;
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn load(
        &self,
        lead_id: Uuid,
    ) -> Result<(Lead, OrchestrationState, Sequence), Error> {
        let lead = self
            .deps
            .store
            .get_lead(lead_id)
            .await?
            .ok_or(OrchestrationError::NotDeployed { lead_id })?;
        let state = self
            .deps
            .store
            .get_state_by_lead(lead_id)
            .await?
            .ok_or(OrchestrationError::NotDeployed { lead_id })?;
        let sequence = self
            .deps
            .store
            .get_sequence(state.sequence_id)
            .await?
            .ok_or(OrchestrationError::NotDeployed { lead_id })?;
        Ok((lead, state, sequence))
    }

    async fn persist(
        &self,
        state: &OrchestrationState,
        expected: OrchestrationStatus,
    ) -> Result<(), Error> {
        match self.deps.store.update_state(state, expected).await {
            Ok(()) => Ok(()),
            Err(DatabaseError::Constraint(_)) => {
                let actual = self
                    .deps
                    .store
                    .get_state_by_lead(state.lead_id)
                    .await?
                    .map(|s| s.status.to_string())
                    .unwrap_or_else(|| "missing".into());
                Err(OrchestrationError::StateConflict {
                    lead_id: state.lead_id,
                    expected: expected.to_string(),
                    actual,
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Execute actions in order. Router-produced actions join the queue.
    async fn apply_actions(
        &self,
        lead: &Lead,
        sequence: &Sequence,
        mut state: OrchestrationState,
        actions: Vec<Action>,
    ) -> Result<(), Error> {
        let mut queue: VecDeque<Action> = actions.into();

        while let Some(action) = queue.pop_front() {
            match action {
                Action::Send {
                    channel,
                    step_number,
                } => {
                    self.send_step(lead, sequence, &state, channel, step_number)
                        .await?;
                }

                Action::Stop { reason } => {
                    if !state.is_terminal() {
                        let expected = state.status;
                        state.stop(reason);
                        self.persist(&state, expected).await?;
                    }
                    let lead_status = match reason {
                        crate::orchestrator::state::StopReason::Bounce => {
                            Some(LeadStatus::Bounced)
                        }
                        crate::orchestrator::state::StopReason::Unsubscribe => {
                            Some(LeadStatus::Unsubscribed)
                        }
                        _ => None,
                    };
                    if let Some(status) = lead_status {
                        self.deps.store.update_lead_status(lead.id, status).await?;
                    }
                    self.deps
                        .store
                        .append_audit(lead.id, &format!("stopped ({})", reason.as_str()))
                        .await?;
                }

                Action::PauseChannel { channel } => {
                    let expected = state.status;
                    state.set_channel_paused(channel, true);
                    self.persist(&state, expected).await?;
                    self.deps
                        .store
                        .append_audit(lead.id, &format!("{channel} channel paused"))
                        .await?;
                }

                Action::ResumeEmail => {
                    self.deps
                        .bus
                        .emit(BusEvent::ResumeEmail { lead_id: lead.id }, None)
                        .await;
                }

                Action::ClassifyReply {
                    channel,
                    body,
                    subject,
                } => {
                    let routed = self
                        .classify_and_route(lead, channel, &body, subject.as_deref())
                        .await?;
                    queue.extend(routed);
                }

                Action::SyncConditionalCopy { signal } => {
                    self.deps
                        .store
                        .append_audit(
                            lead.id,
                            &format!("conditional copy switched to {} variant", signal.as_str()),
                        )
                        .await?;
                }

                Action::Alert {
                    interest_level,
                    signals,
                } => {
                    self.deps
                        .notifier
                        .interest(lead, &interest_level, &signals)
                        .await;
                    self.deps
                        .store
                        .append_audit(lead.id, &format!("interest alert ({interest_level})"))
                        .await?;
                }

                Action::ScheduleResume { at } => {
                    let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    self.deps
                        .bus
                        .emit(BusEvent::ResumeEmail { lead_id: lead.id }, Some(delay))
                        .await;
                    self.deps
                        .store
                        .append_audit(lead.id, &format!("resume scheduled for {}", at.date_naive()))
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Deliver one step, guarded by the `(lead, channel, step)` send key.
    async fn send_step(
        &self,
        lead: &Lead,
        sequence: &Sequence,
        state: &OrchestrationState,
        channel: Channel,
        step_number: u32,
    ) -> Result<(), Error> {
        if self
            .deps
            .store
            .send_recorded(lead.id, channel, step_number)
            .await?
        {
            warn!(lead_id = %lead.id, %channel, step_number, "Duplicate send suppressed");
            return Ok(());
        }

        let Some(step) = sequence.step(channel, step_number) else {
            warn!(lead_id = %lead.id, %channel, step_number, "Send for unknown step dropped");
            return Ok(());
        };

        let rendered = RenderedStep {
            step_number,
            subject: step.subject.clone(),
            body: step.body_for(state.cross_signal).to_string(),
        };

        let sender = match channel {
            Channel::Email => &self.deps.email,
            Channel::Linkedin => &self.deps.linkedin,
        };

        match sender.send(lead, &rendered).await {
            Ok(provider_message_id) => {
                self.deps
                    .store
                    .record_send(lead.id, channel, step_number, Some(&provider_message_id))
                    .await?;
                self.deps
                    .store
                    .append_audit(lead.id, &format!("sent {channel} step {step_number}"))
                    .await?;
                if lead.status == LeadStatus::Sequenced {
                    self.deps
                        .store
                        .update_lead_status(lead.id, LeadStatus::Engaged)
                        .await?;
                }
                Ok(())
            }
            Err(e) => {
                // The durable runtime owns retries; once it gives up this
                // surfaces as a reviewable failure, never a lost step.
                warn!(lead_id = %lead.id, %channel, step_number, error = %e, "Send failed");
                self.deps
                    .store
                    .append_audit(
                        lead.id,
                        &format!("send failed on {channel} step {step_number}: {e}"),
                    )
                    .await?;
                self.deps
                    .store
                    .flag_manual_review(
                        lead.id,
                        None,
                        &format!("send failed on {channel} step {step_number}"),
                    )
                    .await?;
                self.deps.notifier.failure(lead, &e.to_string()).await;
                Ok(())
            }
        }
    }

    /// Store the raw reply, classify it, and run deterministic routing.
    /// Returns the router's actions for the caller's queue.
    async fn classify_and_route(
        &self,
        lead: &Lead,
        channel: Channel,
        body: &str,
        subject: Option<&str>,
    ) -> Result<Vec<Action>, Error> {
        let response_id = self
            .deps
            .store
            .insert_reply(lead.id, channel, subject, body, Utc::now())
            .await?;

        let request = ClassifyRequest {
            response_id,
            reply_text: body.to_string(),
            subject: subject.map(String::from),
            lead_name: lead.display_name(),
            company_name: lead.company_name.clone(),
        };

        let classification = match self.deps.classifier.classify(&request).await {
            Ok(c) => c,
            Err(e) => {
                // Transport-level failure after the runtime's retries: the
                // reply stays queryable in the manual-review queue.
                warn!(lead_id = %lead.id, error = %e, "Classification failed");
                self.deps
                    .store
                    .flag_manual_review(lead.id, Some(response_id), "classification failed")
                    .await?;
                self.deps
                    .store
                    .append_audit(lead.id, "reply classification failed, flagged for review")
                    .await?;
                self.deps.notifier.failure(lead, &e.to_string()).await;
                return Err(OrchestrationError::ClassificationFailed {
                    lead_id: lead.id,
                    reason: e.to_string(),
                }
                .into());
            }
        };

        self.deps.store.insert_classification(&classification).await?;

        let outcome = router::route(
            classification,
            lead,
            body,
            Utc::now(),
            self.config.follow_up_default_days,
        );

        // Every classification updates sentiment and leaves one audit entry.
        self.deps
            .store
            .update_lead_sentiment(lead.id, outcome.sentiment)
            .await?;
        self.deps
            .store
            .append_audit(
                lead.id,
                &format!(
                    "reply classified as {} (confidence {:.2})",
                    outcome.classification.category().as_str(),
                    outcome.classification.confidence
                ),
            )
            .await?;

        if let Some(status) = outcome.lead_status {
            self.deps.store.update_lead_status(lead.id, status).await?;
        }
        if let Some(record) = &outcome.follow_up {
            self.deps.store.insert_follow_up(record).await?;
        }
        if let Some(email) = &outcome.suppress_email {
            self.deps.store.add_suppression(lead.tenant_id, email).await?;
        }
        if outcome.downstream_sync {
            self.deps
                .bus
                .emit(
                    BusEvent::SuppressionSync {
                        tenant_id: lead.tenant_id,
                        email: lead.email.clone(),
                    },
                    None,
                )
                .await;
        }
        if outcome.needs_manual_review {
            self.deps
                .store
                .flag_manual_review(lead.id, Some(response_id), "unclassifiable reply")
                .await?;
        }

        Ok(outcome.actions)
    }
}
