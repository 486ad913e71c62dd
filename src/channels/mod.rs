//! Channel provider clients — pure I/O, no sequencing logic.
//!
//! The engine decides *what* to send; these adapters only deliver it.

pub mod heyreach;
pub mod smartlead;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::events::Channel;
use crate::leads::Lead;

/// A step body after conditional-variant substitution, ready to deliver.
#[derive(Debug, Clone)]
pub struct RenderedStep {
    pub step_number: u32,
    pub subject: Option<String>,
    pub body: String,
}

/// Outbound delivery seam, one implementation per provider.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Which channel this sender delivers on.
    fn channel(&self) -> Channel;

    /// Deliver one rendered step. Returns the provider's message id.
    async fn send(&self, lead: &Lead, step: &RenderedStep) -> Result<String, ChannelError>;
}

pub use heyreach::HeyreachChannel;
pub use smartlead::SmartleadChannel;
