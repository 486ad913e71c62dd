//! Sweep driver — periodic reconciliation for expired waits.
//!
//! Every pass finds leads with `status = waiting` whose deadline has
//! passed and raises exactly one `WaitingTimeout` per lead through the
//! engine. A lead that already left `waiting` is excluded by the status
//! filter, which is what makes overlapping or repeated sweeps safe.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::events::EngineEvent;
use crate::orchestrator::Engine;

/// When sweeps run: a fixed interval or a cron expression.
pub enum SweepSchedule {
    Every(Duration),
    Cron(cron::Schedule),
}

impl SweepSchedule {
    /// Parse `OUTREACH_SWEEP_CRON` when set, else fall back to the interval.
    pub fn from_env(default_interval: Duration) -> Result<Self, ConfigError> {
        match std::env::var("OUTREACH_SWEEP_CRON") {
            Ok(expr) => {
                let schedule =
                    cron::Schedule::from_str(&expr).map_err(|e| ConfigError::InvalidValue {
                        key: "OUTREACH_SWEEP_CRON".into(),
                        message: e.to_string(),
                    })?;
                Ok(Self::Cron(schedule))
            }
            Err(_) => Ok(Self::Every(default_interval)),
        }
    }

    /// Time until the next sweep should run.
    fn next_delay(&self) -> Duration {
        match self {
            Self::Every(interval) => *interval,
            Self::Cron(schedule) => schedule
                .upcoming(Utc)
                .next()
                .and_then(|next| (next - Utc::now()).to_std().ok())
                .unwrap_or(Duration::from_secs(60)),
        }
    }
}

/// Periodic reconciliation pass.
pub struct SweepDriver {
    engine: Arc<Engine>,
    schedule: SweepSchedule,
}

impl SweepDriver {
    pub fn new(engine: Arc<Engine>, schedule: SweepSchedule) -> Self {
        Self { engine, schedule }
    }

    /// Run forever. Spawn this on the runtime.
    pub async fn run(self) {
        // Small start jitter so several instances don't sweep in lockstep.
        let jitter = rand::thread_rng().gen_range(0..30);
        tokio::time::sleep(Duration::from_secs(jitter)).await;
        info!("Sweep driver started");

        loop {
            tokio::time::sleep(self.schedule.next_delay()).await;
            let resumed = self.sweep_once().await;
            if resumed > 0 {
                info!(resumed, "Sweep forced progress on expired waits");
            }
        }
    }

    /// One pass: raise `WaitingTimeout` for every expired wait. Returns the
    /// number of leads that were forced forward.
    pub async fn sweep_once(&self) -> usize {
        let now = Utc::now();
        let expired = match self.engine.store().find_expired_waits(now).await {
            Ok(leads) => leads,
            Err(e) => {
                warn!(error = %e, "Sweep query failed");
                return 0;
            }
        };

        debug!(count = expired.len(), "Sweep found expired waits");

        // Different leads share no state; force them forward concurrently.
        let results = futures::future::join_all(expired.into_iter().map(|lead_id| {
            let engine = Arc::clone(&self.engine);
            async move {
                (
                    lead_id,
                    engine
                        .handle_event(EngineEvent::WaitingTimeout { lead_id })
                        .await,
                )
            }
        }))
        .await;

        let mut resumed = 0;
        for (lead_id, result) in results {
            match result {
                Ok(()) => resumed += 1,
                Err(e) => {
                    // A lead that raced out of waiting is fine; anything
                    // else is worth a log line but must not stop the pass.
                    warn!(lead_id = %lead_id, error = %e, "Forced resume failed");
                }
            }
        }
        resumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_schedule_delay() {
        let schedule = SweepSchedule::Every(Duration::from_secs(900));
        assert_eq!(schedule.next_delay(), Duration::from_secs(900));
    }

    #[test]
    fn cron_schedule_parses_and_yields_future_delay() {
        let schedule = SweepSchedule::Cron(cron::Schedule::from_str("0 */15 * * * *").unwrap());
        let delay = schedule.next_delay();
        assert!(delay <= Duration::from_secs(15 * 60));
    }
}
