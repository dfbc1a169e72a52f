//! Domain Event Types
//!
//! Typed events emitted by the marketplace domain layer. Webhook
//! subscriptions match on the dot-separated event name or the `"*"`
//! wildcard pattern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wildcard subscription pattern matching every event type.
pub const WILDCARD_PATTERN: &str = "*";

/// Event type names as they appear on the wire and in subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A chat message was created.
    #[serde(rename = "message.created")]
    MessageCreated,
    /// A buyer made an offer on a listing.
    #[serde(rename = "offer.made")]
    OfferMade,
    /// A seller accepted an offer.
    #[serde(rename = "offer.accepted")]
    OfferAccepted,
    /// A chat changed state (opened, reserved, closed).
    #[serde(rename = "chat.state_changed")]
    ChatStateChanged,
    /// A user established a live connection.
    #[serde(rename = "user.connected")]
    UserConnected,
    /// A user dropped their live connection.
    #[serde(rename = "user.disconnected")]
    UserDisconnected,
    /// Manual test delivery.
    #[serde(rename = "webhook.test")]
    WebhookTest,
}

impl EventType {
    /// Parse from a string (e.g., `"message.created"`).
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "message.created" => Some(Self::MessageCreated),
            "offer.made" => Some(Self::OfferMade),
            "offer.accepted" => Some(Self::OfferAccepted),
            "chat.state_changed" => Some(Self::ChatStateChanged),
            "user.connected" => Some(Self::UserConnected),
            "user.disconnected" => Some(Self::UserDisconnected),
            "webhook.test" => Some(Self::WebhookTest),
            _ => None,
        }
    }

    /// Convert to the dot-separated string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MessageCreated => "message.created",
            Self::OfferMade => "offer.made",
            Self::OfferAccepted => "offer.accepted",
            Self::ChatStateChanged => "chat.state_changed",
            Self::UserConnected => "user.connected",
            Self::UserDisconnected => "user.disconnected",
            Self::WebhookTest => "webhook.test",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check whether a subscription pattern matches an event type.
///
/// Patterns are exact event names or the wildcard, which matches every
/// event type including ones added after the subscription was created.
pub fn pattern_matches(pattern: &str, event_type: EventType) -> bool {
    pattern == WILDCARD_PATTERN || pattern == event_type.as_str()
}

/// Check whether a string is a valid subscription pattern.
pub fn is_valid_pattern(pattern: &str) -> bool {
    pattern == WILDCARD_PATTERN || EventType::parse_str(pattern).is_some()
}

/// Chat lifecycle states surfaced through `chat.state_changed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    Open,
    Reserved,
    Closed,
}

/// Payload for message events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message_id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Payload for offer events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferPayload {
    pub offer_id: Uuid,
    pub listing_id: Uuid,
    pub chat_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
}

/// Payload for chat state transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStatePayload {
    pub chat_id: Uuid,
    pub state: ChatState,
    pub changed_by: Uuid,
}

/// Payload for connection lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPayload {
    pub user_id: Uuid,
    pub connection_id: String,
}

/// Payload for manual test deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestPayload {
    pub test: bool,
}

/// A domain event with its strongly-typed payload.
///
/// Construction is compile-time checked per event kind; the dispatcher
/// serializes the payload into the envelope's `data` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum DomainEvent {
    #[serde(rename = "message.created")]
    MessageCreated(MessagePayload),
    #[serde(rename = "offer.made")]
    OfferMade(OfferPayload),
    #[serde(rename = "offer.accepted")]
    OfferAccepted(OfferPayload),
    #[serde(rename = "chat.state_changed")]
    ChatStateChanged(ChatStatePayload),
    #[serde(rename = "user.connected")]
    UserConnected(ConnectionPayload),
    #[serde(rename = "user.disconnected")]
    UserDisconnected(ConnectionPayload),
    #[serde(rename = "webhook.test")]
    WebhookTest(TestPayload),
}

impl DomainEvent {
    /// The event type of this event.
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::MessageCreated(_) => EventType::MessageCreated,
            Self::OfferMade(_) => EventType::OfferMade,
            Self::OfferAccepted(_) => EventType::OfferAccepted,
            Self::ChatStateChanged(_) => EventType::ChatStateChanged,
            Self::UserConnected(_) => EventType::UserConnected,
            Self::UserDisconnected(_) => EventType::UserDisconnected,
            Self::WebhookTest(_) => EventType::WebhookTest,
        }
    }

    /// Serialize only the payload (the envelope's `data` field).
    pub fn data_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::MessageCreated(p) => serde_json::to_value(p),
            Self::OfferMade(p) | Self::OfferAccepted(p) => serde_json::to_value(p),
            Self::ChatStateChanged(p) => serde_json::to_value(p),
            Self::UserConnected(p) | Self::UserDisconnected(p) => serde_json::to_value(p),
            Self::WebhookTest(p) => serde_json::to_value(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trip() {
        for et in [
            EventType::MessageCreated,
            EventType::OfferMade,
            EventType::OfferAccepted,
            EventType::ChatStateChanged,
            EventType::UserConnected,
            EventType::UserDisconnected,
            EventType::WebhookTest,
        ] {
            assert_eq!(EventType::parse_str(et.as_str()), Some(et));
        }
        assert_eq!(EventType::parse_str("listing.deleted"), None);
    }

    #[test]
    fn wildcard_matches_every_event_type() {
        for et in [
            EventType::MessageCreated,
            EventType::OfferAccepted,
            EventType::UserDisconnected,
            EventType::WebhookTest,
        ] {
            assert!(pattern_matches(WILDCARD_PATTERN, et));
        }
    }

    #[test]
    fn exact_pattern_matches_only_itself() {
        assert!(pattern_matches("offer.made", EventType::OfferMade));
        assert!(!pattern_matches("offer.made", EventType::OfferAccepted));
        assert!(!pattern_matches("offer", EventType::OfferMade));
    }

    #[test]
    fn pattern_validation() {
        assert!(is_valid_pattern("*"));
        assert!(is_valid_pattern("message.created"));
        assert!(!is_valid_pattern("message.*"));
        assert!(!is_valid_pattern(""));
    }

    #[test]
    fn domain_event_tagged_serialization() {
        let event = DomainEvent::OfferAccepted(OfferPayload {
            offer_id: Uuid::nil(),
            listing_id: Uuid::nil(),
            chat_id: Uuid::nil(),
            buyer_id: Uuid::nil(),
            seller_id: Uuid::nil(),
            amount_cents: 12_500,
            currency: "EUR".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "offer.accepted");
        assert_eq!(json["data"]["amount_cents"], 12_500);
        assert_eq!(event.event_type().as_str(), "offer.accepted");
    }

    #[test]
    fn data_json_excludes_tag() {
        let event = DomainEvent::UserConnected(ConnectionPayload {
            user_id: Uuid::nil(),
            connection_id: "conn-1".to_string(),
        });
        let data = event.data_json().unwrap();
        assert!(data.get("event").is_none());
        assert_eq!(data["connection_id"], "conn-1");
    }
}
