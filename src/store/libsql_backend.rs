//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored as
//! RFC 3339 text; enums as their snake_case strings.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::events::{CanonicalEvent, Channel, EventPayload};
use crate::leads::{Lead, LeadStatus, Sentiment};
use crate::orchestrator::state::{
    OrchestrationState, OrchestrationStatus, StopReason, WaitingFor,
};
use crate::reply::model::{FollowUpRecord, ReplyClassification};
use crate::sequence::{CrossSignal, Sequence, SequenceStep};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn query_err(e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_datetime(&s))
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid {s}: {e}")))
}

fn unique_violation(e: &libsql::Error) -> bool {
    e.to_string().contains("UNIQUE constraint failed")
}

/// Map a row to a Lead.
///
/// Column order: 0:id, 1:tenant_id, 2:email, 3:first_name, 4:last_name,
/// 5:company_name, 6:linkedin_url, 7:status, 8:sentiment,
/// 9:smartlead_lead_id, 10:heyreach_lead_id, 11:created_at, 12:updated_at
const LEAD_COLUMNS: &str = "id, tenant_id, email, first_name, last_name, company_name, \
     linkedin_url, status, sentiment, smartlead_lead_id, heyreach_lead_id, created_at, updated_at";

fn row_to_lead(row: &libsql::Row) -> Result<Lead, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let tenant_id: String = row.get(1).map_err(query_err)?;
    let status: String = row.get(7).map_err(query_err)?;
    let sentiment: String = row.get(8).map_err(query_err)?;
    let created_at: String = row.get(11).map_err(query_err)?;
    let updated_at: String = row.get(12).map_err(query_err)?;

    Ok(Lead {
        id: parse_uuid(&id)?,
        tenant_id: parse_uuid(&tenant_id)?,
        email: row.get(2).map_err(query_err)?,
        first_name: row.get(3).map_err(query_err)?,
        last_name: row.get(4).map_err(query_err)?,
        company_name: row.get(5).map_err(query_err)?,
        linkedin_url: row.get(6).map_err(query_err)?,
        status: status
            .parse::<LeadStatus>()
            .map_err(DatabaseError::Serialization)?,
        sentiment: sentiment
            .parse::<Sentiment>()
            .map_err(DatabaseError::Serialization)?,
        smartlead_lead_id: row.get(9).map_err(query_err)?,
        heyreach_lead_id: row.get(10).map_err(query_err)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

/// Column order for orchestration_states reads.
const STATE_COLUMNS: &str = "id, lead_id, tenant_id, sequence_id, status, \
     email_step_current, linkedin_step_current, email_paused, linkedin_paused, \
     email_completed, linkedin_completed, linkedin_connected, linkedin_wait_expired, \
     cross_signal, waiting_for, waiting_since, waiting_timeout_at, stop_reason, \
     smartlead_lead_id, heyreach_lead_id, started_at, updated_at";

fn row_to_state(row: &libsql::Row) -> Result<OrchestrationState, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let lead_id: String = row.get(1).map_err(query_err)?;
    let tenant_id: String = row.get(2).map_err(query_err)?;
    let sequence_id: String = row.get(3).map_err(query_err)?;
    let status: String = row.get(4).map_err(query_err)?;
    let cross_signal: Option<String> = row.get(13).map_err(query_err)?;
    let waiting_for: Option<String> = row.get(14).map_err(query_err)?;
    let waiting_since: Option<String> = row.get(15).map_err(query_err)?;
    let waiting_timeout_at: Option<String> = row.get(16).map_err(query_err)?;
    let stop_reason: Option<String> = row.get(17).map_err(query_err)?;
    let started_at: String = row.get(20).map_err(query_err)?;
    let updated_at: String = row.get(21).map_err(query_err)?;

    Ok(OrchestrationState {
        id: parse_uuid(&id)?,
        lead_id: parse_uuid(&lead_id)?,
        tenant_id: parse_uuid(&tenant_id)?,
        sequence_id: parse_uuid(&sequence_id)?,
        status: status
            .parse::<OrchestrationStatus>()
            .map_err(DatabaseError::Serialization)?,
        email_step_current: row.get::<i64>(5).map_err(query_err)? as u32,
        linkedin_step_current: row.get::<i64>(6).map_err(query_err)? as u32,
        email_paused: row.get::<i64>(7).map_err(query_err)? != 0,
        linkedin_paused: row.get::<i64>(8).map_err(query_err)? != 0,
        email_completed: row.get::<i64>(9).map_err(query_err)? != 0,
        linkedin_completed: row.get::<i64>(10).map_err(query_err)? != 0,
        linkedin_connected: row.get::<i64>(11).map_err(query_err)? != 0,
        linkedin_wait_expired: row.get::<i64>(12).map_err(query_err)? != 0,
        cross_signal: match cross_signal.as_deref() {
            Some("connected") => Some(CrossSignal::Connected),
            Some("replied") => Some(CrossSignal::Replied),
            _ => None,
        },
        waiting_for: match waiting_for.as_deref() {
            Some("linkedin_connection") => Some(WaitingFor::LinkedinConnection),
            _ => None,
        },
        waiting_since: parse_optional_datetime(waiting_since),
        waiting_timeout_at: parse_optional_datetime(waiting_timeout_at),
        stop_reason: stop_reason.and_then(|s| s.parse::<StopReason>().ok()),
        smartlead_lead_id: row.get(18).map_err(query_err)?,
        heyreach_lead_id: row.get(19).map_err(query_err)?,
        started_at: parse_datetime(&started_at),
        updated_at: parse_datetime(&updated_at),
    })
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn upsert_lead(&self, lead: &Lead) -> Result<Lead, DatabaseError> {
        // Losing a creation race degrades to an update of the winner's row.
        self.conn()
            .execute(
                "INSERT INTO leads (id, tenant_id, email, first_name, last_name, company_name, \
                 linkedin_url, status, sentiment, smartlead_lead_id, heyreach_lead_id, \
                 created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
                 ON CONFLICT(tenant_id, email) DO UPDATE SET \
                 first_name = excluded.first_name, \
                 last_name = excluded.last_name, \
                 company_name = excluded.company_name, \
                 linkedin_url = excluded.linkedin_url, \
                 smartlead_lead_id = COALESCE(excluded.smartlead_lead_id, leads.smartlead_lead_id), \
                 heyreach_lead_id = COALESCE(excluded.heyreach_lead_id, leads.heyreach_lead_id), \
                 updated_at = excluded.updated_at",
                params![
                    lead.id.to_string(),
                    lead.tenant_id.to_string(),
                    lead.email.clone(),
                    lead.first_name.clone(),
                    lead.last_name.clone(),
                    lead.company_name.clone(),
                    lead.linkedin_url.clone(),
                    lead.status.as_str(),
                    lead.sentiment.as_str(),
                    lead.smartlead_lead_id.clone(),
                    lead.heyreach_lead_id.clone(),
                    lead.created_at.to_rfc3339(),
                    lead.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;

        // Re-read so the caller always sees the surviving row.
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE tenant_id = ?1 AND email = ?2"),
                params![lead.tenant_id.to_string(), lead.email.clone()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => row_to_lead(&row),
            None => Err(DatabaseError::NotFound {
                entity: "lead".into(),
                id: lead.email.clone(),
            }),
        }
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_lead(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_lead_by_provider_id(
        &self,
        channel: Channel,
        provider_lead_id: &str,
    ) -> Result<Option<Lead>, DatabaseError> {
        let column = match channel {
            Channel::Email => "smartlead_lead_id",
            Channel::Linkedin => "heyreach_lead_id",
        };
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE {column} = ?1"),
                params![provider_lead_id],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_lead(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_lead_status(&self, id: Uuid, status: LeadStatus) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE leads SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn update_lead_sentiment(
        &self,
        id: Uuid,
        sentiment: Sentiment,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE leads SET sentiment = ?1, updated_at = ?2 WHERE id = ?3",
                params![sentiment.as_str(), Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    // ── Sequences ───────────────────────────────────────────────────

    async fn insert_sequence(&self, sequence: &Sequence) -> Result<(), DatabaseError> {
        let email_steps = serde_json::to_string(&sequence.email_steps)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let linkedin_steps = serde_json::to_string(&sequence.linkedin_steps)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO sequences (id, tenant_id, email_steps, linkedin_steps, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    sequence.id.to_string(),
                    sequence.tenant_id.to_string(),
                    email_steps,
                    linkedin_steps,
                    sequence.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_sequence(&self, id: Uuid) -> Result<Option<Sequence>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, tenant_id, email_steps, linkedin_steps, created_at \
                 FROM sequences WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;

        let Some(row) = rows.next().await.map_err(query_err)? else {
            return Ok(None);
        };

        let id_str: String = row.get(0).map_err(query_err)?;
        let tenant_id: String = row.get(1).map_err(query_err)?;
        let email_steps: String = row.get(2).map_err(query_err)?;
        let linkedin_steps: String = row.get(3).map_err(query_err)?;
        let created_at: String = row.get(4).map_err(query_err)?;

        let email_steps: Vec<SequenceStep> = serde_json::from_str(&email_steps)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let linkedin_steps: Vec<SequenceStep> = serde_json::from_str(&linkedin_steps)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        Ok(Some(Sequence {
            id: parse_uuid(&id_str)?,
            tenant_id: parse_uuid(&tenant_id)?,
            email_steps,
            linkedin_steps,
            created_at: parse_datetime(&created_at),
        }))
    }

    // ── Orchestration state ─────────────────────────────────────────

    async fn insert_state(&self, state: &OrchestrationState) -> Result<(), DatabaseError> {
        let result = self
            .conn()
            .execute(
                "INSERT INTO orchestration_states (id, lead_id, tenant_id, sequence_id, status, \
                 email_step_current, linkedin_step_current, email_paused, linkedin_paused, \
                 email_completed, linkedin_completed, linkedin_connected, linkedin_wait_expired, \
                 cross_signal, waiting_for, waiting_since, waiting_timeout_at, stop_reason, \
                 smartlead_lead_id, heyreach_lead_id, started_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                 ?17, ?18, ?19, ?20, ?21, ?22)",
                state_params(state),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(ref e) if unique_violation(e) => Err(DatabaseError::Constraint(format!(
                "lead {} already has an orchestration state",
                state.lead_id
            ))),
            Err(e) => Err(query_err(e)),
        }
    }

    async fn get_state_by_lead(
        &self,
        lead_id: Uuid,
    ) -> Result<Option<OrchestrationState>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {STATE_COLUMNS} FROM orchestration_states WHERE lead_id = ?1"),
                params![lead_id.to_string()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_state(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_state(
        &self,
        state: &OrchestrationState,
        expected_status: OrchestrationStatus,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE orchestration_states SET status = ?1, \
                 email_step_current = ?2, linkedin_step_current = ?3, \
                 email_paused = ?4, linkedin_paused = ?5, \
                 email_completed = ?6, linkedin_completed = ?7, \
                 linkedin_connected = ?8, linkedin_wait_expired = ?9, \
                 cross_signal = ?10, \
                 waiting_for = ?11, waiting_since = ?12, waiting_timeout_at = ?13, \
                 stop_reason = ?14, updated_at = ?15 \
                 WHERE lead_id = ?16 AND status = ?17",
                params![
                    state.status.as_str(),
                    state.email_step_current as i64,
                    state.linkedin_step_current as i64,
                    state.email_paused as i64,
                    state.linkedin_paused as i64,
                    state.email_completed as i64,
                    state.linkedin_completed as i64,
                    state.linkedin_connected as i64,
                    state.linkedin_wait_expired as i64,
                    state.cross_signal.map(|s| s.as_str()),
                    state.waiting_for.map(|w| w.as_str()),
                    state.waiting_since.map(|t| t.to_rfc3339()),
                    state.waiting_timeout_at.map(|t| t.to_rfc3339()),
                    state.stop_reason.map(|r| r.as_str()),
                    state.updated_at.to_rfc3339(),
                    state.lead_id.to_string(),
                    expected_status.as_str(),
                ],
            )
            .await
            .map_err(query_err)?;

        if affected == 0 {
            return Err(DatabaseError::Constraint(format!(
                "stale state write for lead {} (expected status {})",
                state.lead_id, expected_status
            )));
        }
        Ok(())
    }

    async fn find_expired_waits(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT lead_id FROM orchestration_states \
                 WHERE status = 'waiting' AND waiting_timeout_at < ?1",
                params![now.to_rfc3339()],
            )
            .await
            .map_err(query_err)?;

        let mut lead_ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let id: String = row.get(0).map_err(query_err)?;
            lead_ids.push(parse_uuid(&id)?);
        }
        Ok(lead_ids)
    }

    // ── Events & audit ──────────────────────────────────────────────

    async fn append_event(&self, event: &CanonicalEvent) -> Result<(), DatabaseError> {
        let payload = serde_json::to_string(&event.payload)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO events (id, lead_id, tenant_id, channel, kind, payload, raw, received_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    event.id.to_string(),
                    event.lead_id.to_string(),
                    event.tenant_id.to_string(),
                    event.channel.as_str(),
                    event.kind().as_str(),
                    payload,
                    event.raw.to_string(),
                    event.received_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn list_events(&self, lead_id: Uuid) -> Result<Vec<CanonicalEvent>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, lead_id, tenant_id, channel, payload, raw, received_at \
                 FROM events WHERE lead_id = ?1 ORDER BY received_at",
                params![lead_id.to_string()],
            )
            .await
            .map_err(query_err)?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let id: String = row.get(0).map_err(query_err)?;
            let lead: String = row.get(1).map_err(query_err)?;
            let tenant: String = row.get(2).map_err(query_err)?;
            let channel: String = row.get(3).map_err(query_err)?;
            let payload: String = row.get(4).map_err(query_err)?;
            let raw: String = row.get(5).map_err(query_err)?;
            let received_at: String = row.get(6).map_err(query_err)?;

            let payload: EventPayload = serde_json::from_str(&payload)
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

            events.push(CanonicalEvent {
                id: parse_uuid(&id)?,
                lead_id: parse_uuid(&lead)?,
                tenant_id: parse_uuid(&tenant)?,
                channel: channel
                    .parse::<Channel>()
                    .map_err(DatabaseError::Serialization)?,
                payload,
                raw: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
                received_at: parse_datetime(&received_at),
            });
        }
        Ok(events)
    }

    async fn append_audit(&self, lead_id: Uuid, entry: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO audit_log (id, lead_id, entry, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    lead_id.to_string(),
                    entry,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn list_audit(&self, lead_id: Uuid) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT entry FROM audit_log WHERE lead_id = ?1 ORDER BY created_at",
                params![lead_id.to_string()],
            )
            .await
            .map_err(query_err)?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            entries.push(row.get(0).map_err(query_err)?);
        }
        Ok(entries)
    }

    // ── Replies & classifications ───────────────────────────────────

    async fn insert_reply(
        &self,
        lead_id: Uuid,
        channel: Channel,
        subject: Option<&str>,
        body: &str,
        received_at: DateTime<Utc>,
    ) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        self.conn()
            .execute(
                "INSERT INTO replies (id, lead_id, channel, subject, body, received_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    lead_id.to_string(),
                    channel.as_str(),
                    subject,
                    body,
                    received_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(id)
    }

    async fn insert_classification(
        &self,
        classification: &ReplyClassification,
    ) -> Result<(), DatabaseError> {
        let fields = serde_json::to_string(&classification.fields)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO reply_classifications \
                 (id, response_id, category, confidence, reasoning, fields, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    classification.id.to_string(),
                    classification.response_id.to_string(),
                    classification.category().as_str(),
                    classification.confidence as f64,
                    classification.reasoning.clone(),
                    fields,
                    classification.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    // ── Follow-ups ──────────────────────────────────────────────────

    async fn insert_follow_up(&self, record: &FollowUpRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO follow_ups (id, lead_id, reason, original_reply, follow_up_date, \
                 notes, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id.to_string(),
                    record.lead_id.to_string(),
                    record.reason.clone(),
                    record.original_reply.clone(),
                    record.follow_up_date.to_string(),
                    record.notes.clone(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn list_due_follow_ups(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<FollowUpRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, lead_id, reason, original_reply, follow_up_date, notes, created_at \
                 FROM follow_ups WHERE follow_up_date <= ?1 ORDER BY follow_up_date",
                params![date.to_string()],
            )
            .await
            .map_err(query_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let id: String = row.get(0).map_err(query_err)?;
            let lead_id: String = row.get(1).map_err(query_err)?;
            let follow_up_date: String = row.get(4).map_err(query_err)?;
            let created_at: String = row.get(6).map_err(query_err)?;

            records.push(FollowUpRecord {
                id: parse_uuid(&id)?,
                lead_id: parse_uuid(&lead_id)?,
                reason: row.get(2).map_err(query_err)?,
                original_reply: row.get(3).map_err(query_err)?,
                follow_up_date: follow_up_date
                    .parse()
                    .map_err(|e| DatabaseError::Serialization(format!("bad date: {e}")))?,
                notes: row.get(5).map_err(query_err)?,
                created_at: parse_datetime(&created_at),
            });
        }
        Ok(records)
    }

    // ── Suppression set ─────────────────────────────────────────────

    async fn add_suppression(&self, tenant_id: Uuid, email: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO suppressions (tenant_id, email, created_at) \
                 VALUES (?1, ?2, ?3)",
                params![tenant_id.to_string(), email, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn is_suppressed(&self, tenant_id: Uuid, email: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM suppressions WHERE tenant_id = ?1 AND email = ?2",
                params![tenant_id.to_string(), email],
            )
            .await
            .map_err(query_err)?;
        Ok(rows.next().await.map_err(query_err)?.is_some())
    }

    // ── Send idempotency keys ───────────────────────────────────────

    async fn record_send(
        &self,
        lead_id: Uuid,
        channel: Channel,
        step_number: u32,
        provider_message_id: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO sent_steps \
                 (lead_id, channel, step_number, provider_message_id, sent_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    lead_id.to_string(),
                    channel.as_str(),
                    step_number as i64,
                    provider_message_id,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(affected > 0)
    }

    async fn send_recorded(
        &self,
        lead_id: Uuid,
        channel: Channel,
        step_number: u32,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM sent_steps \
                 WHERE lead_id = ?1 AND channel = ?2 AND step_number = ?3",
                params![lead_id.to_string(), channel.as_str(), step_number as i64],
            )
            .await
            .map_err(query_err)?;
        Ok(rows.next().await.map_err(query_err)?.is_some())
    }

    // ── Manual review queue ─────────────────────────────────────────

    async fn flag_manual_review(
        &self,
        lead_id: Uuid,
        response_id: Option<Uuid>,
        note: &str,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO manual_review (id, lead_id, response_id, note, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    lead_id.to_string(),
                    response_id.map(|r| r.to_string()),
                    note,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

/// Full parameter list for an orchestration_states insert.
fn state_params(state: &OrchestrationState) -> impl libsql::params::IntoParams {
    params![
        state.id.to_string(),
        state.lead_id.to_string(),
        state.tenant_id.to_string(),
        state.sequence_id.to_string(),
        state.status.as_str(),
        state.email_step_current as i64,
        state.linkedin_step_current as i64,
        state.email_paused as i64,
        state.linkedin_paused as i64,
        state.email_completed as i64,
        state.linkedin_completed as i64,
        state.linkedin_connected as i64,
        state.linkedin_wait_expired as i64,
        state.cross_signal.map(|s| s.as_str()),
        state.waiting_for.map(|w| w.as_str()),
        state.waiting_since.map(|t| t.to_rfc3339()),
        state.waiting_timeout_at.map(|t| t.to_rfc3339()),
        state.stop_reason.map(|r| r.as_str()),
        state.smartlead_lead_id.clone(),
        state.heyreach_lead_id.clone(),
        state.started_at.to_rfc3339(),
        state.updated_at.to_rfc3339(),
    ]
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::orchestrator::state::WaitingFor;
    use crate::reply::model::CategoryFields;

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn lead(tenant: Uuid, email: &str) -> Lead {
        Lead::new(tenant, email)
    }

    #[tokio::test]
    async fn upsert_lead_race_degrades_to_update() {
        let db = backend().await;
        let tenant = Uuid::new_v4();

        let first = db.upsert_lead(&lead(tenant, "jane@acme.io")).await.unwrap();

        // A second writer with the same (tenant, email) loses the insert
        // and comes back with the winner's id, fields merged.
        let mut second = lead(tenant, "jane@acme.io");
        second.first_name = Some("Jane".into());
        second.smartlead_lead_id = Some("sl-42".into());
        let merged = db.upsert_lead(&second).await.unwrap();

        assert_eq!(merged.id, first.id);
        assert_eq!(merged.first_name.as_deref(), Some("Jane"));
        assert_eq!(merged.smartlead_lead_id.as_deref(), Some("sl-42"));
    }

    #[tokio::test]
    async fn provider_id_lookup() {
        let db = backend().await;
        let tenant = Uuid::new_v4();
        let mut l = lead(tenant, "jane@acme.io");
        l.heyreach_lead_id = Some("hr-7".into());
        let l = db.upsert_lead(&l).await.unwrap();

        let found = db
            .find_lead_by_provider_id(Channel::Linkedin, "hr-7")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, l.id);
        assert!(
            db.find_lead_by_provider_id(Channel::Email, "hr-7")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn one_state_per_lead_enforced() {
        let db = backend().await;
        let (lead_id, tenant_id) = (Uuid::new_v4(), Uuid::new_v4());
        let sequence = Sequence::new(tenant_id, vec![], vec![]);
        db.insert_sequence(&sequence).await.unwrap();

        let state = OrchestrationState::new(lead_id, tenant_id, sequence.id);
        db.insert_state(&state).await.unwrap();

        let duplicate = OrchestrationState::new(lead_id, tenant_id, sequence.id);
        let err = db.insert_state(&duplicate).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn state_round_trips_including_waiting_fields() {
        let db = backend().await;
        let (lead_id, tenant_id) = (Uuid::new_v4(), Uuid::new_v4());
        let sequence = Sequence::new(tenant_id, vec![], vec![]);
        db.insert_sequence(&sequence).await.unwrap();

        let mut state = OrchestrationState::new(lead_id, tenant_id, sequence.id);
        state.status = OrchestrationStatus::Active;
        state.enter_waiting(WaitingFor::LinkedinConnection, Utc::now(), 48);
        state.email_step_current = 2;
        db.insert_state(&state).await.unwrap();

        let loaded = db.get_state_by_lead(lead_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OrchestrationStatus::Waiting);
        assert_eq!(loaded.waiting_for, Some(WaitingFor::LinkedinConnection));
        assert_eq!(loaded.email_step_current, 2);
        assert!(loaded.waiting_timeout_at.is_some());
    }

    #[tokio::test]
    async fn cas_update_rejects_stale_writer() {
        let db = backend().await;
        let (lead_id, tenant_id) = (Uuid::new_v4(), Uuid::new_v4());
        let sequence = Sequence::new(tenant_id, vec![], vec![]);
        db.insert_sequence(&sequence).await.unwrap();

        let mut state = OrchestrationState::new(lead_id, tenant_id, sequence.id);
        db.insert_state(&state).await.unwrap();

        state.status = OrchestrationStatus::Active;
        db.update_state(&state, OrchestrationStatus::Pending)
            .await
            .unwrap();

        // A second writer that still thinks the row is pending loses.
        let err = db
            .update_state(&state, OrchestrationStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn expired_waits_filter_by_status_and_deadline() {
        let db = backend().await;
        let tenant_id = Uuid::new_v4();
        let sequence = Sequence::new(tenant_id, vec![], vec![]);
        db.insert_sequence(&sequence).await.unwrap();

        let now = Utc::now();

        // Expired waiting lead.
        let expired_lead = Uuid::new_v4();
        let mut expired = OrchestrationState::new(expired_lead, tenant_id, sequence.id);
        expired.status = OrchestrationStatus::Active;
        expired.enter_waiting(WaitingFor::LinkedinConnection, now - Duration::hours(50), 48);
        db.insert_state(&expired).await.unwrap();

        // Still-waiting lead, deadline in the future.
        let fresh_lead = Uuid::new_v4();
        let mut fresh = OrchestrationState::new(fresh_lead, tenant_id, sequence.id);
        fresh.status = OrchestrationStatus::Active;
        fresh.enter_waiting(WaitingFor::LinkedinConnection, now, 48);
        db.insert_state(&fresh).await.unwrap();

        // Active lead (was waiting, resumed) — excluded by the status filter.
        let resumed_lead = Uuid::new_v4();
        let mut resumed = OrchestrationState::new(resumed_lead, tenant_id, sequence.id);
        resumed.status = OrchestrationStatus::Active;
        db.insert_state(&resumed).await.unwrap();

        let due = db.find_expired_waits(now).await.unwrap();
        assert_eq!(due, vec![expired_lead]);
    }

    #[tokio::test]
    async fn sequence_round_trips_steps() {
        let db = backend().await;
        let tenant_id = Uuid::new_v4();
        let sequence = Sequence::new(
            tenant_id,
            vec![
                crate::sequence::SequenceStep::new(1, 0, "intro").with_trigger_linkedin(1),
            ],
            vec![crate::sequence::SequenceStep::new(1, 0, "note")],
        );
        db.insert_sequence(&sequence).await.unwrap();

        let loaded = db.get_sequence(sequence.id).await.unwrap().unwrap();
        assert_eq!(loaded.email_steps.len(), 1);
        assert_eq!(loaded.email_steps[0].trigger_linkedin, Some(1));
        assert_eq!(loaded.linkedin_steps[0].body, "note");
    }

    #[tokio::test]
    async fn event_log_appends_and_lists() {
        let db = backend().await;
        let (lead_id, tenant_id) = (Uuid::new_v4(), Uuid::new_v4());

        let event = CanonicalEvent::new(
            lead_id,
            tenant_id,
            Channel::Email,
            EventPayload::Replied {
                body: "sounds good".into(),
                subject: None,
                provider_message_id: None,
            },
            serde_json::json!({"campaign_id": 7}),
            Utc::now(),
        );
        db.append_event(&event).await.unwrap();

        let events = db.list_events(lead_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), crate::events::EventKind::Replied);
        assert_eq!(events[0].raw["campaign_id"], 7);
    }

    #[tokio::test]
    async fn suppression_set() {
        let db = backend().await;
        let tenant = Uuid::new_v4();

        assert!(!db.is_suppressed(tenant, "jane@acme.io").await.unwrap());
        db.add_suppression(tenant, "jane@acme.io").await.unwrap();
        // Double-add is fine.
        db.add_suppression(tenant, "jane@acme.io").await.unwrap();
        assert!(db.is_suppressed(tenant, "jane@acme.io").await.unwrap());
        // Scoped per tenant.
        assert!(
            !db.is_suppressed(Uuid::new_v4(), "jane@acme.io")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn send_keys_are_idempotent() {
        let db = backend().await;
        let lead_id = Uuid::new_v4();

        assert!(
            db.record_send(lead_id, Channel::Email, 1, Some("m-1"))
                .await
                .unwrap()
        );
        assert!(
            !db.record_send(lead_id, Channel::Email, 1, Some("m-1-dup"))
                .await
                .unwrap()
        );
        assert!(db.send_recorded(lead_id, Channel::Email, 1).await.unwrap());
        assert!(!db.send_recorded(lead_id, Channel::Linkedin, 1).await.unwrap());
    }

    #[tokio::test]
    async fn reply_and_classification_round_trip() {
        let db = backend().await;
        let lead_id = Uuid::new_v4();

        let response_id = db
            .insert_reply(lead_id, Channel::Email, Some("Re: intro"), "stop emailing me", Utc::now())
            .await
            .unwrap();

        let classification =
            ReplyClassification::new(response_id, 0.97, "explicit removal", CategoryFields::RemoveMe);
        db.insert_classification(&classification).await.unwrap();
    }

    #[tokio::test]
    async fn local_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outreach.db");
        let tenant = Uuid::new_v4();

        let lead_id = {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.upsert_lead(&Lead::new(tenant, "jane@acme.io"))
                .await
                .unwrap()
                .id
        };

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let lead = db.get_lead(lead_id).await.unwrap().unwrap();
        assert_eq!(lead.email, "jane@acme.io");
    }

    #[tokio::test]
    async fn follow_ups_due_listing() {
        let db = backend().await;
        let lead_id = Uuid::new_v4();
        let today = Utc::now().date_naive();

        let due = FollowUpRecord::new(lead_id, "not_interested_now", "try Q3", today, None);
        let later = FollowUpRecord::new(
            lead_id,
            "not_interested_now",
            "next year",
            today + Duration::days(200),
            None,
        );
        db.insert_follow_up(&due).await.unwrap();
        db.insert_follow_up(&later).await.unwrap();

        let found = db.list_due_follow_ups(today).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }
}
