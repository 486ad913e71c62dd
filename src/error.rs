//! Error types for the outreach engine.

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Research error: {0}")]
    Research(#[from] ResearchError),

    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Channel-provider errors (Smartlead / HeyReach HTTP clients).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Send failed on channel {channel}: {reason}")]
    SendFailed { channel: String, reason: String },

    #[error("Provider {provider} returned {status}: {body}")]
    ProviderStatus {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Rate limited on channel {channel}")]
    RateLimited { channel: String },
}

/// Reply-classifier errors.
///
/// Parse failures are deliberately absent: non-conforming model output is
/// coerced to `other`/0.0 by the router, never surfaced as an error.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Inbound event errors — the drop-and-log class.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Unmapped event type {raw_type} from provider {provider}")]
    Unmapped { provider: String, raw_type: String },

    #[error("Unknown lead for provider id {provider_lead_id}")]
    UnknownLead { provider_lead_id: String },

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

/// Waterfall evidence-resolution errors.
///
/// These stay inside a single stage: the resolver logs them and folds the
/// stage as insufficient rather than propagating.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("Stage {stage} fetch failed: {reason}")]
    StageFailed { stage: String, reason: String },

    #[error("Stage {stage} returned malformed data: {reason}")]
    MalformedEvidence { stage: String, reason: String },
}

/// Orchestration errors — structured, non-retriable business outcomes.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Lead {lead_id} already has an active orchestration")]
    AlreadyDeployed { lead_id: Uuid },

    #[error("No orchestration state for lead {lead_id}")]
    NotDeployed { lead_id: Uuid },

    #[error("Invalid status transition {from} -> {to} for lead {lead_id}")]
    InvalidTransition {
        lead_id: Uuid,
        from: String,
        to: String,
    },

    #[error("Stale write for lead {lead_id}: expected status {expected}, found {actual}")]
    StateConflict {
        lead_id: Uuid,
        expected: String,
        actual: String,
    },

    #[error("Deployment failed for lead {lead_id}: {reason}")]
    DeploymentFailed { lead_id: Uuid, reason: String },

    #[error("Classification failed for lead {lead_id}: {reason}")]
    ClassificationFailed { lead_id: Uuid, reason: String },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
