//! Unified `Database` trait — single async interface for all persistence.
//!
//! The engine never touches SQL; everything goes through this seam so
//! tests can run against the in-memory backend.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::events::{CanonicalEvent, Channel};
use crate::leads::{Lead, LeadStatus, Sentiment};
use crate::orchestrator::state::{OrchestrationState, OrchestrationStatus};
use crate::reply::model::{FollowUpRecord, ReplyClassification};
use crate::sequence::Sequence;

/// Backend-agnostic database trait covering leads, sequences, orchestration
/// state, events, classifications, follow-ups, and the suppression set.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Leads ───────────────────────────────────────────────────────

    /// Idempotent upsert keyed on `(tenant_id, email)`.
    ///
    /// A concurrent loser re-reads the winning row and returns it updated
    /// with the non-identity fields of `lead` — never an error.
    async fn upsert_lead(&self, lead: &Lead) -> Result<Lead, DatabaseError>;

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, DatabaseError>;

    /// Look up a lead by a channel provider's lead id.
    async fn find_lead_by_provider_id(
        &self,
        channel: Channel,
        provider_lead_id: &str,
    ) -> Result<Option<Lead>, DatabaseError>;

    async fn update_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<(), DatabaseError>;

    async fn update_lead_sentiment(
        &self,
        id: Uuid,
        sentiment: Sentiment,
    ) -> Result<(), DatabaseError>;

    // ── Sequences ───────────────────────────────────────────────────

    async fn insert_sequence(&self, sequence: &Sequence) -> Result<(), DatabaseError>;

    async fn get_sequence(&self, id: Uuid) -> Result<Option<Sequence>, DatabaseError>;

    // ── Orchestration state ─────────────────────────────────────────

    /// Insert the one-and-only state row for a lead.
    ///
    /// Returns `Constraint` if the lead already has one.
    async fn insert_state(&self, state: &OrchestrationState) -> Result<(), DatabaseError>;

    async fn get_state_by_lead(
        &self,
        lead_id: Uuid,
    ) -> Result<Option<OrchestrationState>, DatabaseError>;

    /// Compare-and-swap update: writes `state` only if the stored status
    /// still equals `expected_status`. Returns `Constraint` when stale —
    /// the single-writer-per-lead guard.
    async fn update_state(
        &self,
        state: &OrchestrationState,
        expected_status: OrchestrationStatus,
    ) -> Result<(), DatabaseError>;

    /// Lead ids with `status = waiting` and `waiting_timeout_at < now`.
    async fn find_expired_waits(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, DatabaseError>;

    // ── Events & audit ──────────────────────────────────────────────

    /// Append one canonical event to the event log.
    async fn append_event(&self, event: &CanonicalEvent) -> Result<(), DatabaseError>;

    async fn list_events(&self, lead_id: Uuid) -> Result<Vec<CanonicalEvent>, DatabaseError>;

    async fn append_audit(&self, lead_id: Uuid, entry: &str) -> Result<(), DatabaseError>;

    async fn list_audit(&self, lead_id: Uuid) -> Result<Vec<String>, DatabaseError>;

    // ── Replies & classifications ───────────────────────────────────

    /// Store a raw inbound reply; returns the new response id.
    async fn insert_reply(
        &self,
        lead_id: Uuid,
        channel: Channel,
        subject: Option<&str>,
        body: &str,
        received_at: DateTime<Utc>,
    ) -> Result<Uuid, DatabaseError>;

    /// Append the immutable classification for a stored reply.
    async fn insert_classification(
        &self,
        classification: &ReplyClassification,
    ) -> Result<(), DatabaseError>;

    // ── Follow-ups ──────────────────────────────────────────────────

    async fn insert_follow_up(&self, record: &FollowUpRecord) -> Result<(), DatabaseError>;

    /// Follow-ups due on or before `date`.
    async fn list_due_follow_ups(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<FollowUpRecord>, DatabaseError>;

    // ── Suppression set ─────────────────────────────────────────────

    async fn add_suppression(&self, tenant_id: Uuid, email: &str) -> Result<(), DatabaseError>;

    async fn is_suppressed(&self, tenant_id: Uuid, email: &str) -> Result<bool, DatabaseError>;

    // ── Send idempotency keys ───────────────────────────────────────

    /// Record a committed send keyed `(lead, channel, step_number)`.
    ///
    /// Returns `false` if the key already existed (duplicate delivery).
    async fn record_send(
        &self,
        lead_id: Uuid,
        channel: Channel,
        step_number: u32,
        provider_message_id: Option<&str>,
    ) -> Result<bool, DatabaseError>;

    async fn send_recorded(
        &self,
        lead_id: Uuid,
        channel: Channel,
        step_number: u32,
    ) -> Result<bool, DatabaseError>;

    // ── Manual review queue ─────────────────────────────────────────

    async fn flag_manual_review(
        &self,
        lead_id: Uuid,
        response_id: Option<Uuid>,
        note: &str,
    ) -> Result<(), DatabaseError>;
}
