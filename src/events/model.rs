//! Canonical event model.
//!
//! Provider webhooks arrive in heterogeneous vocabularies; the mapping
//! layer normalizes them into this one event set before anything touches
//! the state machine. Events are append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A delivery medium carrying outreach steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Linkedin,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Linkedin => "linkedin",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "linkedin" => Ok(Self::Linkedin),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// The canonical event vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Sent,
    Opened,
    Clicked,
    Replied,
    Bounced,
    ConnectionSent,
    Connected,
    MessageSent,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Replied => "replied",
            Self::Bounced => "bounced",
            Self::ConnectionSent => "connection_sent",
            Self::Connected => "connected",
            Self::MessageSent => "message_sent",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload per canonical event kind.
///
/// Only the fields the engine actually reads are typed here; everything
/// else a provider sends rides along in [`CanonicalEvent::raw`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Sent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_message_id: Option<String>,
    },
    Opened,
    Clicked {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    Replied {
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_message_id: Option<String>,
    },
    Bounced {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ConnectionSent,
    Connected,
    MessageSent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_message_id: Option<String>,
    },
}

impl EventPayload {
    /// The canonical kind this payload belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Sent { .. } => EventKind::Sent,
            Self::Opened => EventKind::Opened,
            Self::Clicked { .. } => EventKind::Clicked,
            Self::Replied { .. } => EventKind::Replied,
            Self::Bounced { .. } => EventKind::Bounced,
            Self::ConnectionSent => EventKind::ConnectionSent,
            Self::Connected => EventKind::Connected,
            Self::MessageSent { .. } => EventKind::MessageSent,
        }
    }
}

/// A normalized inbound event, ready for the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub tenant_id: Uuid,
    pub channel: Channel,
    pub payload: EventPayload,
    /// Unrecognized provider fields, preserved verbatim for audit.
    pub raw: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl CanonicalEvent {
    pub fn new(
        lead_id: Uuid,
        tenant_id: Uuid,
        channel: Channel,
        payload: EventPayload,
        raw: serde_json::Value,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            tenant_id,
            channel,
            payload,
            raw,
            received_at,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// What the state machine consumes: a provider event, or the internal
/// timeout the sweep driver raises when a wait deadline has passed.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Canonical(CanonicalEvent),
    WaitingTimeout { lead_id: Uuid },
}

impl EngineEvent {
    pub fn lead_id(&self) -> Uuid {
        match self {
            Self::Canonical(e) => e.lead_id,
            Self::WaitingTimeout { lead_id } => *lead_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kind_round_trip() {
        let payload = EventPayload::Replied {
            body: "sounds interesting".into(),
            subject: Some("Re: intro".into()),
            provider_message_id: None,
        };
        assert_eq!(payload.kind(), EventKind::Replied);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "replied");
        assert!(json.get("provider_message_id").is_none());
    }

    #[test]
    fn channel_parses() {
        assert_eq!("email".parse::<Channel>().unwrap(), Channel::Email);
        assert_eq!("linkedin".parse::<Channel>().unwrap(), Channel::Linkedin);
        assert!("carrier_pigeon".parse::<Channel>().is_err());
    }

    #[test]
    fn engine_event_lead_id() {
        let lead_id = Uuid::new_v4();
        let event = EngineEvent::WaitingTimeout { lead_id };
        assert_eq!(event.lead_id(), lead_id);
    }
}
