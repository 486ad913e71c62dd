//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                email TEXT NOT NULL,
                first_name TEXT,
                last_name TEXT,
                company_name TEXT,
                linkedin_url TEXT,
                status TEXT NOT NULL DEFAULT 'new',
                sentiment TEXT NOT NULL DEFAULT 'neutral',
                smartlead_lead_id TEXT,
                heyreach_lead_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (tenant_id, email)
            );
            CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(status);
            CREATE INDEX IF NOT EXISTS idx_leads_smartlead ON leads(smartlead_lead_id);
            CREATE INDEX IF NOT EXISTS idx_leads_heyreach ON leads(heyreach_lead_id);

            CREATE TABLE IF NOT EXISTS sequences (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                email_steps TEXT NOT NULL,
                linkedin_steps TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS orchestration_states (
                id TEXT PRIMARY KEY,
                lead_id TEXT NOT NULL UNIQUE,
                tenant_id TEXT NOT NULL,
                sequence_id TEXT NOT NULL REFERENCES sequences(id),
                status TEXT NOT NULL DEFAULT 'pending',
                email_step_current INTEGER NOT NULL DEFAULT 0,
                linkedin_step_current INTEGER NOT NULL DEFAULT 0,
                email_paused INTEGER NOT NULL DEFAULT 0,
                linkedin_paused INTEGER NOT NULL DEFAULT 0,
                email_completed INTEGER NOT NULL DEFAULT 0,
                linkedin_completed INTEGER NOT NULL DEFAULT 0,
                linkedin_connected INTEGER NOT NULL DEFAULT 0,
                linkedin_wait_expired INTEGER NOT NULL DEFAULT 0,
                cross_signal TEXT,
                waiting_for TEXT,
                waiting_since TEXT,
                waiting_timeout_at TEXT,
                stop_reason TEXT,
                smartlead_lead_id TEXT,
                heyreach_lead_id TEXT,
                started_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_states_status ON orchestration_states(status);
            CREATE INDEX IF NOT EXISTS idx_states_waiting
                ON orchestration_states(status, waiting_timeout_at);

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                lead_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                raw TEXT NOT NULL DEFAULT '{}',
                received_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_lead ON events(lead_id);
            CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind);

            CREATE TABLE IF NOT EXISTS replies (
                id TEXT PRIMARY KEY,
                lead_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                subject TEXT,
                body TEXT NOT NULL,
                received_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_replies_lead ON replies(lead_id);

            CREATE TABLE IF NOT EXISTS reply_classifications (
                id TEXT PRIMARY KEY,
                response_id TEXT NOT NULL UNIQUE REFERENCES replies(id),
                category TEXT NOT NULL,
                confidence REAL NOT NULL,
                reasoning TEXT NOT NULL,
                fields TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS follow_ups (
                id TEXT PRIMARY KEY,
                lead_id TEXT NOT NULL,
                reason TEXT NOT NULL,
                original_reply TEXT NOT NULL,
                follow_up_date TEXT NOT NULL,
                notes TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_follow_ups_date ON follow_ups(follow_up_date);

            CREATE TABLE IF NOT EXISTS suppressions (
                tenant_id TEXT NOT NULL,
                email TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, email)
            );

            CREATE TABLE IF NOT EXISTS sent_steps (
                lead_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                step_number INTEGER NOT NULL,
                provider_message_id TEXT,
                sent_at TEXT NOT NULL,
                PRIMARY KEY (lead_id, channel, step_number)
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id TEXT PRIMARY KEY,
                lead_id TEXT NOT NULL,
                entry TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_lead ON audit_log(lead_id);

            CREATE TABLE IF NOT EXISTS manual_review (
                id TEXT PRIMARY KEY,
                lead_id TEXT NOT NULL,
                response_id TEXT,
                note TEXT NOT NULL,
                resolved INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_manual_review_open ON manual_review(resolved);
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Record a migration as applied.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
