//! Inbound event handling: canonical model, provider mapping, webhooks.

pub mod mapping;
pub mod model;
pub mod webhook;

pub use mapping::{PROVIDER_HEYREACH, PROVIDER_SMARTLEAD, ProviderMappings};
pub use model::{CanonicalEvent, Channel, EngineEvent, EventKind, EventPayload};
