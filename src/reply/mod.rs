//! Reply classification and deterministic routing.

pub mod classifier;
pub mod model;
pub mod router;

pub use classifier::{ClassifyRequest, LlmReplyClassifier, ReplyClassifier};
pub use model::{CategoryFields, FollowUpRecord, ReplyCategory, ReplyClassification};
pub use router::{RoutingOutcome, route};
