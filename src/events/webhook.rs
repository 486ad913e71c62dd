//! Provider webhook endpoints.
//!
//! One route per provider. Signature verification is best-effort: a
//! missing or mismatched signature is logged and processing continues,
//! because not every provider signs. Unmapped event types and unknown
//! leads are dropped with a log line and a 200 — providers should not
//! retry what we chose to ignore.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use tracing::{error, warn};

use crate::error::Error;
use crate::events::mapping::{self, PROVIDER_HEYREACH, PROVIDER_SMARTLEAD, ProviderMappings};
use crate::events::model::{CanonicalEvent, EngineEvent};
use crate::orchestrator::Engine;

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    pub engine: Arc<Engine>,
    pub mappings: Arc<ProviderMappings>,
    pub smartlead_secret: Option<String>,
    pub heyreach_secret: Option<String>,
}

/// Build the webhook router.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/webhooks/smartlead", post(smartlead_webhook))
        .route("/webhooks/heyreach", post(heyreach_webhook))
        .with_state(state)
}

/// POST /webhooks/smartlead
async fn smartlead_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> impl IntoResponse {
    check_signature(&headers, state.smartlead_secret.as_deref(), PROVIDER_SMARTLEAD);
    handle_provider_event(&state, PROVIDER_SMARTLEAD, payload).await
}

/// POST /webhooks/heyreach
async fn heyreach_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> impl IntoResponse {
    check_signature(&headers, state.heyreach_secret.as_deref(), PROVIDER_HEYREACH);
    handle_provider_event(&state, PROVIDER_HEYREACH, payload).await
}

/// Best-effort shared-secret check. Never rejects.
fn check_signature(headers: &HeaderMap, secret: Option<&str>, provider: &str) {
    let Some(secret) = secret else {
        return;
    };
    let presented = headers
        .get("x-webhook-signature")
        .and_then(|v| v.to_str().ok());
    if presented != Some(secret) {
        warn!(provider, "Webhook signature mismatch, processing anyway");
    }
}

async fn handle_provider_event(
    state: &WebhookState,
    provider: &str,
    payload: serde_json::Value,
) -> (StatusCode, Json<serde_json::Value>) {
    let ok = (StatusCode::OK, Json(serde_json::json!({"status": "ok"})));

    let Some(raw_type) = event_type(&payload) else {
        warn!(provider, "Webhook payload has no event type, dropping");
        return ok;
    };

    // Unmapped types are already logged inside `map`.
    let Some((channel, kind)) = state.mappings.map(provider, raw_type) else {
        return ok;
    };

    let Some(provider_lead_id) = provider_lead_id(&payload) else {
        warn!(provider, raw_type, "Webhook payload has no lead id, dropping");
        return ok;
    };

    let lead = match state
        .engine
        .store()
        .find_lead_by_provider_id(channel, &provider_lead_id)
        .await
    {
        Ok(Some(lead)) => lead,
        Ok(None) => {
            warn!(provider, provider_lead_id, "Webhook for unknown lead, dropping");
            return ok;
        }
        Err(e) => {
            error!(provider, error = %e, "Lead lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "lookup failed"})),
            );
        }
    };

    let event = CanonicalEvent::new(
        lead.id,
        lead.tenant_id,
        channel,
        mapping::extract_payload(kind, &payload),
        payload,
        Utc::now(),
    );

    match state.engine.handle_event(EngineEvent::Canonical(event)).await {
        Ok(()) => ok,
        // A lead that raced into a new status will see this event again on
        // the provider's retry; tell them to retry.
        Err(Error::Orchestration(ref o)) => {
            warn!(provider, lead_id = %lead.id, error = %o, "Event processing conflict");
            (
                StatusCode::CONFLICT,
                Json(serde_json::json!({"error": "conflict, retry"})),
            )
        }
        Err(e) => {
            error!(provider, lead_id = %lead.id, error = %e, "Event processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "processing failed"})),
            )
        }
    }
}

/// Providers disagree on the event-type key.
fn event_type(payload: &serde_json::Value) -> Option<&str> {
    payload
        .get("event_type")
        .or_else(|| payload.get("eventType"))
        .and_then(|v| v.as_str())
}

/// Providers disagree on the lead-id key (and its type).
fn provider_lead_id(payload: &serde_json::Value) -> Option<String> {
    let v = payload
        .get("lead_id")
        .or_else(|| payload.get("leadId"))
        .or_else(|| payload.get("sl_lead_id"))?;
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_reads_both_spellings() {
        let snake = serde_json::json!({"event_type": "EMAIL_REPLY"});
        let camel = serde_json::json!({"eventType": "MESSAGE_REPLY"});
        assert_eq!(event_type(&snake), Some("EMAIL_REPLY"));
        assert_eq!(event_type(&camel), Some("MESSAGE_REPLY"));
        assert_eq!(event_type(&serde_json::json!({})), None);
    }

    #[test]
    fn lead_id_accepts_strings_and_numbers() {
        assert_eq!(
            provider_lead_id(&serde_json::json!({"lead_id": "sl-9"})),
            Some("sl-9".into())
        );
        assert_eq!(
            provider_lead_id(&serde_json::json!({"leadId": 42})),
            Some("42".into())
        );
        assert_eq!(provider_lead_id(&serde_json::json!({"lead_id": null})), None);
    }
}
