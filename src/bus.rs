//! Event bus — the seam over the durable runtime's scheduling surface.
//!
//! Both immediate dispatch and delayed re-invocation (OOO restarts,
//! next-tick scheduling) go through `emit`. The in-process implementation
//! backs delays with spawned sleepers; a production deployment can swap in
//! a durable scheduler without touching the engine.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Internal events the engine schedules for itself or downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    /// Run a tick for this lead.
    Tick { lead_id: Uuid },
    /// Unpause the email channel and tick (OOO restart, wait resolution).
    ResumeEmail { lead_id: Uuid },
    /// Tell the downstream CRM sync about a suppression.
    SuppressionSync { tenant_id: Uuid, email: String },
}

/// Emit-with-optional-delay, the only scheduling primitive the core uses.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn emit(&self, event: BusEvent, delay: Option<Duration>);
}

/// In-process bus over a tokio channel.
pub struct TokioEventBus {
    tx: mpsc::Sender<BusEvent>,
}

impl TokioEventBus {
    /// Create the bus and the receiving end the engine loop consumes.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<BusEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventBus for TokioEventBus {
    async fn emit(&self, event: BusEvent, delay: Option<Duration>) {
        match delay {
            None => {
                if let Err(e) = self.tx.send(event).await {
                    warn!(error = %e, "Event bus receiver dropped, event lost");
                }
            }
            Some(delay) => {
                debug!(?event, ?delay, "Scheduling delayed event");
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = tx.send(event).await {
                        warn!(error = %e, "Event bus receiver dropped, delayed event lost");
                    }
                });
            }
        }
    }
}
