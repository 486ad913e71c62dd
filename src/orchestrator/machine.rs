//! The orchestration decision functions.
//!
//! `process_event` and `tick` are pure: same state + same input always
//! yields the same transition. All I/O (persistence, provider sends,
//! classification) happens in the engine shell that executes the returned
//! actions. Idempotency falls out of the step pointers — a send is keyed
//! `(lead, channel, step_number)` and a pointer that already advanced past
//! a step means that send is never re-emitted.

use chrono::{DateTime, Utc};

use crate::events::{CanonicalEvent, Channel, EngineEvent, EventPayload};
use crate::orchestrator::state::{
    OrchestrationState, OrchestrationStatus, StopReason, WaitingFor,
};
use crate::sequence::{CrossSignal, Sequence, StepPrecondition};

/// An effect for the engine shell to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send a sequence step on a channel.
    Send { channel: Channel, step_number: u32 },
    /// Permanently stop sequencing for this lead.
    Stop { reason: StopReason },
    /// Pause one channel (the other continues).
    PauseChannel { channel: Channel },
    /// Resume email from the current step pointer.
    ResumeEmail,
    /// Route an inbound reply through the classification router.
    ClassifyReply {
        channel: Channel,
        body: String,
        subject: Option<String>,
    },
    /// Rewrite not-yet-sent step bodies to the variant for this signal.
    SyncConditionalCopy { signal: CrossSignal },
    /// Escalate to a human.
    Alert {
        interest_level: String,
        signals: Vec<String>,
    },
    /// Ask the event bus for a deferred resume at a wall-clock time.
    ScheduleResume { at: DateTime<Utc> },
}

/// Result of `process_event`.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: OrchestrationState,
    pub actions: Vec<Action>,
}

/// When the engine should tick this lead again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Re-tick after this many whole days (0 = immediately).
    After { days: i64 },
    /// Suspended on a wait; a connection event or the sweep resumes it.
    Suspended,
    /// Nothing schedulable right now (e.g. all remaining work is on a
    /// paused channel); a resume event re-ticks.
    Idle,
    /// Terminal — never tick again.
    Done,
}

/// Result of `tick`.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub state: OrchestrationState,
    pub actions: Vec<Action>,
    pub schedule: Schedule,
}

/// React to one event. Pure and total.
pub fn process_event(
    state: &OrchestrationState,
    sequence: &Sequence,
    event: &EngineEvent,
) -> Transition {
    let mut next = state.clone();
    let mut actions = Vec::new();

    // Terminal leads only audit-log; a second `bounced` after a stop emits
    // nothing, which is what makes duplicate deliveries no-ops.
    if next.is_terminal() {
        return Transition { state: next, actions };
    }

    match event {
        EngineEvent::Canonical(canonical) => {
            process_canonical(&mut next, sequence, canonical, &mut actions);
        }
        EngineEvent::WaitingTimeout { .. } => {
            // Forced resume. Only meaningful while actually waiting; a lead
            // that already moved on makes a repeated sweep a no-op.
            if next.status == OrchestrationStatus::Waiting {
                next.clear_waiting();
                next.linkedin_wait_expired = true;
                actions.push(Action::ResumeEmail);
            }
        }
    }

    Transition { state: next, actions }
}

fn process_canonical(
    next: &mut OrchestrationState,
    sequence: &Sequence,
    event: &CanonicalEvent,
    actions: &mut Vec<Action>,
) {
    match &event.payload {
        EventPayload::Bounced { .. } => {
            next.stop(StopReason::Bounce);
            actions.push(Action::Stop {
                reason: StopReason::Bounce,
            });
        }

        EventPayload::Replied { body, subject, .. } => {
            actions.push(Action::ClassifyReply {
                channel: event.channel,
                body: body.clone(),
                subject: subject.clone(),
            });

            // A LinkedIn reply can retune pending email copy.
            if event.channel == Channel::Linkedin {
                next.set_cross_signal(CrossSignal::Replied);
                if sequence.has_pending_conditional(
                    Channel::Email,
                    next.email_step_current,
                    CrossSignal::Replied,
                ) {
                    actions.push(Action::SyncConditionalCopy {
                        signal: CrossSignal::Replied,
                    });
                }
            }
        }

        EventPayload::Connected => {
            next.linkedin_connected = true;
            next.set_cross_signal(CrossSignal::Connected);
            next.updated_at = event.received_at;

            if next.status == OrchestrationStatus::Waiting
                && next.waiting_for == Some(WaitingFor::LinkedinConnection)
            {
                next.clear_waiting();
                actions.push(Action::ResumeEmail);
            }

            if sequence.has_pending_conditional(
                Channel::Email,
                next.email_step_current,
                CrossSignal::Connected,
            ) {
                actions.push(Action::SyncConditionalCopy {
                    signal: CrossSignal::Connected,
                });
            }
        }

        // Delivery telemetry: audit log append only, no decision.
        EventPayload::Sent { .. }
        | EventPayload::Opened
        | EventPayload::Clicked { .. }
        | EventPayload::ConnectionSent
        | EventPayload::MessageSent { .. } => {}
    }
}

/// Advance step execution. Pure; one step per channel per tick, with a
/// `Schedule::After { days: 0 }` hint when more work is immediately due.
pub fn tick(
    state: &OrchestrationState,
    sequence: &Sequence,
    now: DateTime<Utc>,
    default_wait_hours: i64,
) -> TickOutcome {
    let mut next = state.clone();
    let mut actions = Vec::new();

    if next.is_terminal() {
        return TickOutcome {
            state: next,
            actions,
            schedule: Schedule::Done,
        };
    }

    if next.status == OrchestrationStatus::Waiting {
        return TickOutcome {
            state: next,
            actions,
            schedule: Schedule::Suspended,
        };
    }

    if next.status == OrchestrationStatus::Pending {
        next.status = OrchestrationStatus::Active;
        next.started_at = now;
        next.updated_at = now;
    }

    let elapsed_days = next.elapsed_days(now);

    'channels: for channel in [Channel::Email, Channel::Linkedin] {
        if next.channel_paused(channel) || next.channel_completed(channel) {
            continue;
        }

        let Some(step) = sequence.next_step(channel, next.step_current(channel)) else {
            next.set_channel_completed(channel);
            continue;
        };

        if elapsed_days < step.day_offset {
            continue;
        }

        match step.precondition {
            Some(StepPrecondition::RequiresConnection) if !next.linkedin_connected => {
                if next.linkedin_wait_expired {
                    // Forced resume already burned the wait; give up on the
                    // LinkedIn channel rather than re-suspending forever.
                    next.set_channel_completed(channel);
                    continue;
                }
                next.enter_waiting(WaitingFor::LinkedinConnection, now, default_wait_hours);
                break 'channels;
            }
            Some(StepPrecondition::WaitForLinkedin { timeout_hours })
                if !next.linkedin_connected && !next.linkedin_wait_expired =>
            {
                next.enter_waiting(WaitingFor::LinkedinConnection, now, timeout_hours);
                break 'channels;
            }
            _ => {}
        }

        actions.push(Action::Send {
            channel,
            step_number: step.step_number,
        });
        let trigger_linkedin = step.trigger_linkedin;
        next.advance_step(channel, step.step_number);
        if sequence.next_step(channel, next.step_current(channel)).is_none() {
            next.set_channel_completed(channel);
        }

        // An email step may pull a specific LinkedIn step forward with it.
        if channel == Channel::Email
            && let Some(li_step_number) = trigger_linkedin
        {
            maybe_trigger_linkedin(&mut next, sequence, li_step_number, &mut actions);
        }
    }

    if next.status == OrchestrationStatus::Active
        && next.email_completed
        && next.linkedin_completed
    {
        next.status = OrchestrationStatus::Completed;
        next.updated_at = now;
    }

    let schedule = match next.status {
        OrchestrationStatus::Waiting => Schedule::Suspended,
        s if s.is_terminal() => Schedule::Done,
        _ => {
            // Only channels that can actually run count toward scheduling;
            // a paused channel re-ticks on its resume event instead.
            let min_offset = [Channel::Email, Channel::Linkedin]
                .into_iter()
                .filter(|&c| !next.channel_paused(c) && !next.channel_completed(c))
                .filter_map(|c| sequence.next_step(c, next.step_current(c)))
                .map(|s| s.day_offset)
                .min();
            match min_offset {
                Some(offset) => Schedule::After {
                    days: (offset - elapsed_days).max(0),
                },
                None => Schedule::Idle,
            }
        }
    };

    TickOutcome {
        state: next,
        actions,
        schedule,
    }
}

fn maybe_trigger_linkedin(
    next: &mut OrchestrationState,
    sequence: &Sequence,
    step_number: u32,
    actions: &mut Vec<Action>,
) {
    if next.linkedin_paused
        || next.linkedin_completed
        || step_number <= next.linkedin_step_current
    {
        return;
    }
    let Some(step) = sequence.step(Channel::Linkedin, step_number) else {
        return;
    };
    // The triggered step still honors its own gate; an unmet precondition
    // leaves it for the normal tick path.
    if matches!(step.precondition, Some(StepPrecondition::RequiresConnection))
        && !next.linkedin_connected
    {
        return;
    }
    actions.push(Action::Send {
        channel: Channel::Linkedin,
        step_number,
    });
    next.advance_step(Channel::Linkedin, step_number);
    if sequence
        .next_step(Channel::Linkedin, next.linkedin_step_current)
        .is_none()
    {
        next.set_channel_completed(Channel::Linkedin);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use uuid::Uuid;

    use super::*;
    use crate::events::EventKind;
    use crate::sequence::SequenceStep;

    fn event(channel: Channel, payload: EventPayload) -> EngineEvent {
        EngineEvent::Canonical(CanonicalEvent::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            channel,
            payload,
            serde_json::json!({}),
            Utc::now(),
        ))
    }

    fn simple_sequence() -> Sequence {
        Sequence::new(
            Uuid::new_v4(),
            vec![
                SequenceStep::new(1, 0, "intro email"),
                SequenceStep::new(2, 3, "bump email"),
            ],
            vec![SequenceStep::new(1, 0, "connection note")],
        )
    }

    fn active_state(sequence: &Sequence) -> OrchestrationState {
        let mut state = OrchestrationState::new(Uuid::new_v4(), sequence.tenant_id, sequence.id);
        state.status = OrchestrationStatus::Active;
        state
    }

    // ── process_event ───────────────────────────────────────────────

    #[test]
    fn bounce_stops_permanently() {
        let seq = simple_sequence();
        let state = active_state(&seq);

        let t = process_event(
            &state,
            &seq,
            &event(Channel::Email, EventPayload::Bounced { reason: None }),
        );
        assert_eq!(t.state.status, OrchestrationStatus::Stopped);
        assert_eq!(t.state.stop_reason, Some(StopReason::Bounce));
        assert_eq!(
            t.actions,
            vec![Action::Stop {
                reason: StopReason::Bounce
            }]
        );
    }

    #[test]
    fn duplicate_bounce_is_a_no_op() {
        let seq = simple_sequence();
        let state = active_state(&seq);

        let first = process_event(
            &state,
            &seq,
            &event(Channel::Email, EventPayload::Bounced { reason: None }),
        );
        let second = process_event(
            &first.state,
            &seq,
            &event(Channel::Email, EventPayload::Bounced { reason: None }),
        );
        assert!(second.actions.is_empty());
        assert_eq!(second.state.status, OrchestrationStatus::Stopped);
    }

    #[test]
    fn reply_routes_to_classifier() {
        let seq = simple_sequence();
        let state = active_state(&seq);

        let t = process_event(
            &state,
            &seq,
            &event(
                Channel::Email,
                EventPayload::Replied {
                    body: "tell me more".into(),
                    subject: Some("Re: intro".into()),
                    provider_message_id: None,
                },
            ),
        );
        assert_eq!(
            t.actions,
            vec![Action::ClassifyReply {
                channel: Channel::Email,
                body: "tell me more".into(),
                subject: Some("Re: intro".into()),
            }]
        );
        // Classification itself decides any status change.
        assert_eq!(t.state.status, OrchestrationStatus::Active);
    }

    #[test]
    fn connection_while_waiting_resumes_email() {
        let seq = simple_sequence();
        let mut state = active_state(&seq);
        state.enter_waiting(WaitingFor::LinkedinConnection, Utc::now(), 48);

        let t = process_event(&state, &seq, &event(Channel::Linkedin, EventPayload::Connected));
        assert_eq!(t.state.status, OrchestrationStatus::Active);
        assert!(t.state.linkedin_connected);
        assert!(t.state.waiting_timeout_at.is_none());
        assert!(t.actions.contains(&Action::ResumeEmail));
    }

    #[test]
    fn connection_syncs_pending_conditional_copy() {
        let seq = Sequence::new(
            Uuid::new_v4(),
            vec![
                SequenceStep::new(1, 0, "intro"),
                SequenceStep::new(2, 3, "bump")
                    .with_conditional_body(CrossSignal::Connected, "bump, connected"),
            ],
            vec![],
        );
        let state = active_state(&seq);

        let t = process_event(&state, &seq, &event(Channel::Linkedin, EventPayload::Connected));
        assert!(t.actions.contains(&Action::SyncConditionalCopy {
            signal: CrossSignal::Connected
        }));
    }

    #[test]
    fn connection_without_pending_conditional_does_not_sync() {
        let seq = simple_sequence();
        let state = active_state(&seq);

        let t = process_event(&state, &seq, &event(Channel::Linkedin, EventPayload::Connected));
        assert!(
            !t.actions
                .iter()
                .any(|a| matches!(a, Action::SyncConditionalCopy { .. }))
        );
    }

    #[test]
    fn linkedin_reply_syncs_replied_variant() {
        let seq = Sequence::new(
            Uuid::new_v4(),
            vec![
                SequenceStep::new(1, 0, "intro"),
                SequenceStep::new(2, 3, "bump")
                    .with_conditional_body(CrossSignal::Replied, "you mentioned on linkedin…"),
            ],
            vec![SequenceStep::new(1, 0, "note")],
        );
        let state = active_state(&seq);

        let t = process_event(
            &state,
            &seq,
            &event(
                Channel::Linkedin,
                EventPayload::Replied {
                    body: "interesting".into(),
                    subject: None,
                    provider_message_id: None,
                },
            ),
        );
        assert!(t.actions.contains(&Action::SyncConditionalCopy {
            signal: CrossSignal::Replied
        }));
        assert!(
            t.actions
                .iter()
                .any(|a| matches!(a, Action::ClassifyReply { .. }))
        );
    }

    #[test]
    fn waiting_timeout_forces_resume() {
        let seq = simple_sequence();
        let mut state = active_state(&seq);
        state.enter_waiting(WaitingFor::LinkedinConnection, Utc::now() - Duration::hours(80), 72);

        let t = process_event(
            &state,
            &seq,
            &EngineEvent::WaitingTimeout {
                lead_id: state.lead_id,
            },
        );
        assert_eq!(t.state.status, OrchestrationStatus::Active);
        assert!(t.state.linkedin_wait_expired);
        // Forced resume clears waiting even though the connection never came.
        assert!(!t.state.linkedin_connected);
        assert_eq!(t.actions, vec![Action::ResumeEmail]);
    }

    #[test]
    fn waiting_timeout_on_non_waiting_lead_is_a_no_op() {
        let seq = simple_sequence();
        let state = active_state(&seq);

        let t = process_event(
            &state,
            &seq,
            &EngineEvent::WaitingTimeout {
                lead_id: state.lead_id,
            },
        );
        assert!(t.actions.is_empty());
        assert_eq!(t.state.status, OrchestrationStatus::Active);
    }

    #[test]
    fn double_sweep_produces_one_resume() {
        let seq = simple_sequence();
        let mut state = active_state(&seq);
        state.enter_waiting(WaitingFor::LinkedinConnection, Utc::now() - Duration::hours(80), 72);

        let first = process_event(
            &state,
            &seq,
            &EngineEvent::WaitingTimeout {
                lead_id: state.lead_id,
            },
        );
        assert_eq!(first.actions, vec![Action::ResumeEmail]);

        // Second sweep sees a lead no longer waiting.
        let second = process_event(
            &first.state,
            &seq,
            &EngineEvent::WaitingTimeout {
                lead_id: state.lead_id,
            },
        );
        assert!(second.actions.is_empty());
    }

    #[test]
    fn telemetry_events_change_nothing() {
        let seq = simple_sequence();
        let state = active_state(&seq);

        for payload in [
            EventPayload::Sent {
                provider_message_id: None,
            },
            EventPayload::Opened,
            EventPayload::Clicked { url: None },
            EventPayload::ConnectionSent,
            EventPayload::MessageSent {
                provider_message_id: None,
            },
        ] {
            let kind = payload.kind();
            let t = process_event(&state, &seq, &event(Channel::Email, payload));
            assert!(t.actions.is_empty(), "{kind} should emit no actions");
            assert_eq!(t.state.status, state.status);
            assert_eq!(t.state.email_step_current, state.email_step_current);
        }
        assert_eq!(EventKind::Opened.as_str(), "opened");
    }

    #[test]
    fn events_on_terminal_lead_are_no_ops() {
        let seq = simple_sequence();
        let mut state = active_state(&seq);
        state.stop(StopReason::Unsubscribe);

        let t = process_event(
            &state,
            &seq,
            &event(
                Channel::Email,
                EventPayload::Replied {
                    body: "hello?".into(),
                    subject: None,
                    provider_message_id: None,
                },
            ),
        );
        assert!(t.actions.is_empty());
    }

    // ── tick ────────────────────────────────────────────────────────

    #[test]
    fn first_tick_activates_and_sends_due_steps() {
        let seq = simple_sequence();
        let state = OrchestrationState::new(Uuid::new_v4(), seq.tenant_id, seq.id);

        let out = tick(&state, &seq, Utc::now(), 72);
        assert_eq!(out.state.status, OrchestrationStatus::Active);
        assert_eq!(
            out.actions,
            vec![
                Action::Send {
                    channel: Channel::Email,
                    step_number: 1
                },
                Action::Send {
                    channel: Channel::Linkedin,
                    step_number: 1
                },
            ]
        );
        assert_eq!(out.state.email_step_current, 1);
        assert_eq!(out.state.linkedin_step_current, 1);
    }

    #[test]
    fn re_tick_does_not_re_send_executed_steps() {
        let seq = simple_sequence();
        let state = OrchestrationState::new(Uuid::new_v4(), seq.tenant_id, seq.id);

        let now = Utc::now();
        let first = tick(&state, &seq, now, 72);
        let second = tick(&first.state, &seq, now, 72);
        assert!(second.actions.is_empty());
        // Next email step is 3 days out.
        assert_eq!(second.schedule, Schedule::After { days: 3 });
    }

    #[test]
    fn future_steps_wait_their_day_offset() {
        let seq = simple_sequence();
        let mut state = active_state(&seq);
        state.email_step_current = 1;
        state.linkedin_step_current = 1;
        state.started_at = Utc::now() - Duration::days(1);

        let out = tick(&state, &seq, Utc::now(), 72);
        assert!(out.actions.is_empty());
        assert_eq!(out.schedule, Schedule::After { days: 2 });
    }

    #[test]
    fn due_step_sends_after_elapsed_days() {
        let seq = simple_sequence();
        let mut state = active_state(&seq);
        state.email_step_current = 1;
        state.linkedin_step_current = 1;
        state.started_at = Utc::now() - Duration::days(3);

        let out = tick(&state, &seq, Utc::now(), 72);
        assert_eq!(
            out.actions,
            vec![Action::Send {
                channel: Channel::Email,
                step_number: 2
            }]
        );
    }

    #[test]
    fn requires_connection_waits_never_sends() {
        let seq = Sequence::new(
            Uuid::new_v4(),
            vec![],
            vec![
                SequenceStep::new(1, 0, "thanks for connecting")
                    .with_precondition(StepPrecondition::RequiresConnection),
            ],
        );
        let mut state = active_state(&seq);
        state.email_completed = true;

        let out = tick(&state, &seq, Utc::now(), 48);
        assert_eq!(out.state.status, OrchestrationStatus::Waiting);
        assert_eq!(out.state.waiting_for, Some(WaitingFor::LinkedinConnection));
        assert!(out.state.waiting_timeout_at.is_some());
        assert!(out.actions.is_empty());
        assert_eq!(out.schedule, Schedule::Suspended);
    }

    #[test]
    fn wait_for_linkedin_email_step_suspends_with_step_timeout() {
        let seq = Sequence::new(
            Uuid::new_v4(),
            vec![
                SequenceStep::new(1, 0, "after you connect…").with_precondition(
                    StepPrecondition::WaitForLinkedin { timeout_hours: 24 },
                ),
            ],
            vec![],
        );
        let state = OrchestrationState::new(Uuid::new_v4(), seq.tenant_id, seq.id);

        let now = Utc::now();
        let out = tick(&state, &seq, now, 72);
        assert_eq!(out.state.status, OrchestrationStatus::Waiting);
        assert_eq!(out.state.waiting_timeout_at, Some(now + Duration::hours(24)));
    }

    #[test]
    fn expired_wait_lets_email_proceed() {
        let seq = Sequence::new(
            Uuid::new_v4(),
            vec![
                SequenceStep::new(1, 0, "fallback copy").with_precondition(
                    StepPrecondition::WaitForLinkedin { timeout_hours: 24 },
                ),
            ],
            vec![],
        );
        let mut state = active_state(&seq);
        state.linkedin_wait_expired = true;
        state.linkedin_completed = true;

        let out = tick(&state, &seq, Utc::now(), 72);
        assert_eq!(
            out.actions,
            vec![Action::Send {
                channel: Channel::Email,
                step_number: 1
            }]
        );
    }

    #[test]
    fn expired_wait_abandons_requires_connection_step() {
        let seq = Sequence::new(
            Uuid::new_v4(),
            vec![SequenceStep::new(1, 0, "email 1")],
            vec![
                SequenceStep::new(1, 0, "needs connection")
                    .with_precondition(StepPrecondition::RequiresConnection),
            ],
        );
        let mut state = active_state(&seq);
        state.linkedin_wait_expired = true;

        let out = tick(&state, &seq, Utc::now(), 72);
        assert!(out.state.linkedin_completed);
        assert_eq!(
            out.actions,
            vec![Action::Send {
                channel: Channel::Email,
                step_number: 1
            }]
        );
    }

    #[test]
    fn connected_satisfies_requires_connection() {
        let seq = Sequence::new(
            Uuid::new_v4(),
            vec![],
            vec![
                SequenceStep::new(1, 0, "thanks")
                    .with_precondition(StepPrecondition::RequiresConnection),
            ],
        );
        let mut state = active_state(&seq);
        state.email_completed = true;
        state.linkedin_connected = true;

        let out = tick(&state, &seq, Utc::now(), 48);
        assert_eq!(
            out.actions,
            vec![Action::Send {
                channel: Channel::Linkedin,
                step_number: 1
            }]
        );
    }

    #[test]
    fn exhausted_channels_complete_the_lead() {
        let seq = simple_sequence();
        let mut state = active_state(&seq);
        state.email_step_current = 2;
        state.linkedin_step_current = 1;

        let out = tick(&state, &seq, Utc::now(), 72);
        assert!(out.state.email_completed);
        assert!(out.state.linkedin_completed);
        assert_eq!(out.state.status, OrchestrationStatus::Completed);
        assert_eq!(out.schedule, Schedule::Done);
    }

    #[test]
    fn tick_on_terminal_lead_is_a_no_op() {
        let seq = simple_sequence();
        let mut state = active_state(&seq);
        state.stop(StopReason::Bounce);

        let out = tick(&state, &seq, Utc::now(), 72);
        assert!(out.actions.is_empty());
        assert_eq!(out.schedule, Schedule::Done);
        assert_eq!(out.state.email_step_current, 0);
    }

    #[test]
    fn tick_while_waiting_is_suspended() {
        let seq = simple_sequence();
        let mut state = active_state(&seq);
        state.enter_waiting(WaitingFor::LinkedinConnection, Utc::now(), 48);

        let out = tick(&state, &seq, Utc::now(), 72);
        assert!(out.actions.is_empty());
        assert_eq!(out.schedule, Schedule::Suspended);
    }

    #[test]
    fn paused_channel_is_skipped() {
        let seq = simple_sequence();
        let mut state = active_state(&seq);
        state.email_paused = true;

        let out = tick(&state, &seq, Utc::now(), 72);
        assert_eq!(
            out.actions,
            vec![Action::Send {
                channel: Channel::Linkedin,
                step_number: 1
            }]
        );
        assert_eq!(out.state.email_step_current, 0);
    }

    #[test]
    fn email_step_triggers_linkedin_step() {
        let seq = Sequence::new(
            Uuid::new_v4(),
            vec![SequenceStep::new(1, 0, "intro").with_trigger_linkedin(1)],
            vec![SequenceStep::new(1, 5, "connection note")],
        );
        let state = OrchestrationState::new(Uuid::new_v4(), seq.tenant_id, seq.id);

        let out = tick(&state, &seq, Utc::now(), 72);
        // The triggered LinkedIn step goes out with the email even though
        // its own day_offset is further out.
        assert_eq!(
            out.actions,
            vec![
                Action::Send {
                    channel: Channel::Email,
                    step_number: 1
                },
                Action::Send {
                    channel: Channel::Linkedin,
                    step_number: 1
                },
            ]
        );
        assert_eq!(out.state.linkedin_step_current, 1);
    }

    #[test]
    fn triggered_linkedin_step_honors_connection_gate() {
        let seq = Sequence::new(
            Uuid::new_v4(),
            vec![SequenceStep::new(1, 0, "intro").with_trigger_linkedin(1)],
            vec![
                SequenceStep::new(1, 0, "dm")
                    .with_precondition(StepPrecondition::RequiresConnection),
            ],
        );
        let state = OrchestrationState::new(Uuid::new_v4(), seq.tenant_id, seq.id);

        let out = tick(&state, &seq, Utc::now(), 72);
        let sends: Vec<_> = out
            .actions
            .iter()
            .filter(|a| matches!(a, Action::Send { .. }))
            .collect();
        assert_eq!(sends.len(), 1, "unconnected trigger must not send the DM");
        assert_eq!(out.state.linkedin_step_current, 0);
    }

    #[test]
    fn no_path_from_active_to_converted_via_events() {
        // Exhaustive: no single canonical event moves active → converted.
        let seq = simple_sequence();
        let state = active_state(&seq);
        let payloads = [
            EventPayload::Sent {
                provider_message_id: None,
            },
            EventPayload::Opened,
            EventPayload::Clicked { url: None },
            EventPayload::Replied {
                body: "x".into(),
                subject: None,
                provider_message_id: None,
            },
            EventPayload::Bounced { reason: None },
            EventPayload::ConnectionSent,
            EventPayload::Connected,
            EventPayload::MessageSent {
                provider_message_id: None,
            },
        ];
        for payload in payloads {
            for channel in [Channel::Email, Channel::Linkedin] {
                let t = process_event(&state, &seq, &event(channel, payload.clone()));
                assert_ne!(t.state.status, OrchestrationStatus::Converted);
            }
        }
    }
}
