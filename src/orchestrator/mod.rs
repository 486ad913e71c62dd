//! Per-lead orchestration: the pure state machine and its engine shell.

pub mod engine;
pub mod machine;
pub mod state;

pub use engine::{Engine, EngineDeps, Notifier};
pub use machine::{Action, Schedule, TickOutcome, Transition, process_event, tick};
pub use state::{OrchestrationState, OrchestrationStatus, StopReason, WaitingFor};
