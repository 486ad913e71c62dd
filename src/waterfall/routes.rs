//! REST endpoint exposing evidence resolution.
//!
//! The sequence generator (an external collaborator) calls this once per
//! lead, before any sequence exists, and feeds the returned triggers into
//! content generation.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;
use uuid::Uuid;

use crate::leads::LeadStatus;
use crate::store::Database;
use crate::waterfall::WaterfallResolver;

/// Shared state for the research routes.
#[derive(Clone)]
pub struct ResearchRouteState {
    pub resolver: Arc<WaterfallResolver>,
    pub store: Arc<dyn Database>,
}

/// POST /api/research/{lead_id}
///
/// Runs the waterfall for one lead and returns the accumulated triggers.
/// Always 200 for a known lead — an empty trigger list is a valid outcome.
async fn resolve_lead(
    State(state): State<ResearchRouteState>,
    Path(lead_id): Path<Uuid>,
) -> impl IntoResponse {
    let lead = match state.store.get_lead(lead_id).await {
        Ok(Some(lead)) => lead,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "unknown lead"})),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    let _ = state
        .store
        .update_lead_status(lead_id, LeadStatus::Researching)
        .await;

    let outcome = state.resolver.resolve(&lead).await;
    info!(
        lead_id = %lead_id,
        triggers = outcome.triggers.len(),
        "Research resolution served"
    );
    Json(serde_json::json!({
        "triggers": outcome.triggers,
        "stages_used": outcome.stages_used,
    }))
    .into_response()
}

/// Build the research REST routes.
pub fn research_routes(state: ResearchRouteState) -> Router {
    Router::new()
        .route("/api/research/{lead_id}", post(resolve_lead))
        .with_state(state)
}
