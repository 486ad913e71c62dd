//! Provider event-type mapping.
//!
//! A static lookup table per provider normalizes webhook vocabularies into
//! the canonical event set. Unmapped types are logged and dropped — never
//! propagated as errors. The table is keyed by provider name so a new
//! channel is a table entry, not a state-machine change.

use std::collections::HashMap;

use tracing::warn;

use crate::events::model::{Channel, EventKind, EventPayload};

/// Provider name for the email channel.
pub const PROVIDER_SMARTLEAD: &str = "smartlead";
/// Provider name for the LinkedIn channel.
pub const PROVIDER_HEYREACH: &str = "heyreach";

/// Static provider → canonical event mappings.
pub struct ProviderMappings {
    table: HashMap<(&'static str, &'static str), (Channel, EventKind)>,
}

impl ProviderMappings {
    /// The built-in Smartlead + HeyReach table.
    pub fn builtin() -> Self {
        let entries: &[(&str, &str, Channel, EventKind)] = &[
            // Smartlead (email)
            (PROVIDER_SMARTLEAD, "EMAIL_SENT", Channel::Email, EventKind::Sent),
            (PROVIDER_SMARTLEAD, "EMAIL_OPEN", Channel::Email, EventKind::Opened),
            (PROVIDER_SMARTLEAD, "EMAIL_LINK_CLICK", Channel::Email, EventKind::Clicked),
            (PROVIDER_SMARTLEAD, "EMAIL_REPLY", Channel::Email, EventKind::Replied),
            (PROVIDER_SMARTLEAD, "EMAIL_BOUNCE", Channel::Email, EventKind::Bounced),
            // HeyReach (linkedin)
            (PROVIDER_HEYREACH, "CONNECTION_REQUEST_SENT", Channel::Linkedin, EventKind::ConnectionSent),
            (PROVIDER_HEYREACH, "CONNECTION_REQUEST_ACCEPTED", Channel::Linkedin, EventKind::Connected),
            (PROVIDER_HEYREACH, "MESSAGE_SENT", Channel::Linkedin, EventKind::MessageSent),
            (PROVIDER_HEYREACH, "MESSAGE_REPLY", Channel::Linkedin, EventKind::Replied),
            (PROVIDER_HEYREACH, "INMAIL_REPLY", Channel::Linkedin, EventKind::Replied),
        ];

        let mut table = HashMap::new();
        for (provider, raw_type, channel, kind) in entries {
            table.insert((*provider, *raw_type), (*channel, *kind));
        }
        Self { table }
    }

    /// Map a provider event type to its canonical (channel, kind).
    ///
    /// Returns `None` for unknown providers or unmapped types; the caller
    /// drops the event after the warn log here.
    pub fn map(&self, provider: &str, raw_event_type: &str) -> Option<(Channel, EventKind)> {
        let hit = self.table.get(&(provider, raw_event_type)).copied();
        if hit.is_none() {
            warn!(provider, raw_event_type, "Unmapped provider event type, dropping");
        }
        hit
    }
}

impl Default for ProviderMappings {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Build a typed payload for a mapped event from the provider's raw JSON.
///
/// Pulls only the fields the canonical payload needs; the full raw body is
/// preserved separately on the event.
pub fn extract_payload(kind: EventKind, raw: &serde_json::Value) -> EventPayload {
    let str_field = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| raw.get(*k).and_then(|v| v.as_str()))
            .map(String::from)
    };

    match kind {
        EventKind::Sent => EventPayload::Sent {
            provider_message_id: str_field(&["message_id", "stats_id"]),
        },
        EventKind::Opened => EventPayload::Opened,
        EventKind::Clicked => EventPayload::Clicked {
            url: str_field(&["link", "url"]),
        },
        EventKind::Replied => EventPayload::Replied {
            body: str_field(&["reply_body", "message_body", "body", "message"])
                .unwrap_or_default(),
            subject: str_field(&["subject", "reply_subject"]),
            provider_message_id: str_field(&["message_id", "reply_message_id"]),
        },
        EventKind::Bounced => EventPayload::Bounced {
            reason: str_field(&["bounce_reason", "reason"]),
        },
        EventKind::ConnectionSent => EventPayload::ConnectionSent,
        EventKind::Connected => EventPayload::Connected,
        EventKind::MessageSent => EventPayload::MessageSent {
            provider_message_id: str_field(&["message_id"]),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_smartlead_reply() {
        let mappings = ProviderMappings::builtin();
        let (channel, kind) = mappings.map(PROVIDER_SMARTLEAD, "EMAIL_REPLY").unwrap();
        assert_eq!(channel, Channel::Email);
        assert_eq!(kind, EventKind::Replied);
    }

    #[test]
    fn maps_heyreach_connection_accepted() {
        let mappings = ProviderMappings::builtin();
        let (channel, kind) = mappings
            .map(PROVIDER_HEYREACH, "CONNECTION_REQUEST_ACCEPTED")
            .unwrap();
        assert_eq!(channel, Channel::Linkedin);
        assert_eq!(kind, EventKind::Connected);
    }

    #[test]
    fn unmapped_type_returns_none() {
        let mappings = ProviderMappings::builtin();
        assert!(mappings.map(PROVIDER_SMARTLEAD, "EMAIL_UNSUBSCRIBE").is_none());
        assert!(mappings.map("unknown_provider", "EMAIL_REPLY").is_none());
    }

    #[test]
    fn inmail_reply_also_maps_to_replied() {
        let mappings = ProviderMappings::builtin();
        let (_, kind) = mappings.map(PROVIDER_HEYREACH, "INMAIL_REPLY").unwrap();
        assert_eq!(kind, EventKind::Replied);
    }

    #[test]
    fn extracts_reply_body_from_alternate_keys() {
        let raw = serde_json::json!({
            "reply_body": "not right now, try me in Q3",
            "subject": "Re: quick question",
            "campaign_id": 991,
        });
        match extract_payload(EventKind::Replied, &raw) {
            EventPayload::Replied { body, subject, .. } => {
                assert_eq!(body, "not right now, try me in Q3");
                assert_eq!(subject.as_deref(), Some("Re: quick question"));
            }
            other => panic!("expected Replied, got {other:?}"),
        }
    }

    #[test]
    fn extracts_bounce_reason() {
        let raw = serde_json::json!({"bounce_reason": "mailbox unavailable"});
        match extract_payload(EventKind::Bounced, &raw) {
            EventPayload::Bounced { reason } => {
                assert_eq!(reason.as_deref(), Some("mailbox unavailable"));
            }
            other => panic!("expected Bounced, got {other:?}"),
        }
    }
}
