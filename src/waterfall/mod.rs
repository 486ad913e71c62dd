//! Waterfall evidence resolver.
//!
//! Runs an ordered list of evidence stages with early exit: after each
//! stage the sufficiency rule decides whether later (broader, noisier)
//! stages can be skipped. A stage that errors or comes back empty is
//! treated as insufficient — resolution never fails and never retries a
//! stage; it returns whatever accumulated, even nothing.

pub mod routes;
pub mod stages;
pub mod types;

use tracing::{debug, info, warn};

use crate::leads::Lead;
use crate::waterfall::stages::EvidenceStage;
use crate::waterfall::types::{Trigger, is_sufficient, sort_triggers};

/// Result of one resolution run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WaterfallOutcome {
    /// Accumulated triggers, sorted by score desc then recency.
    pub triggers: Vec<Trigger>,
    /// Names of the stages that were consulted, in order.
    pub stages_used: Vec<String>,
}

/// Sequential fallback over evidence sources.
pub struct WaterfallResolver {
    stages: Vec<Box<dyn EvidenceStage>>,
}

impl WaterfallResolver {
    pub fn new(stages: Vec<Box<dyn EvidenceStage>>) -> Self {
        Self { stages }
    }

    /// Fold the stage list, stopping as soon as evidence is sufficient.
    pub async fn resolve(&self, lead: &Lead) -> WaterfallOutcome {
        let mut triggers: Vec<Trigger> = Vec::new();
        let mut stages_used = Vec::new();

        for stage in &self.stages {
            stages_used.push(stage.name().to_string());

            match stage.fetch(lead).await {
                Ok(found) => {
                    debug!(
                        lead_id = %lead.id,
                        stage = stage.name(),
                        count = found.len(),
                        "Evidence stage complete"
                    );
                    triggers.extend(found);
                }
                Err(e) => {
                    // An erroring stage contributes nothing; the fold continues.
                    warn!(lead_id = %lead.id, stage = stage.name(), error = %e, "Evidence stage failed");
                }
            }

            if is_sufficient(&triggers) {
                debug!(
                    lead_id = %lead.id,
                    stage = stage.name(),
                    "Evidence sufficient, skipping remaining stages"
                );
                break;
            }
        }

        sort_triggers(&mut triggers);
        info!(
            lead_id = %lead.id,
            triggers = triggers.len(),
            stages = stages_used.len(),
            "Waterfall resolution complete"
        );

        WaterfallOutcome {
            triggers,
            stages_used,
        }
    }
}
