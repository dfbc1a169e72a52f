//! Message Delivery Types
//!
//! Queue jobs, offline entries, and the payload pushed over a live
//! connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::presence::PresenceError;

/// Kind of chat message; offers are transactional and jump the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Offer,
    System,
}

/// Delivery priority lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
}

impl MessageKind {
    /// Negotiation/offer messages are dispatched ahead of plain chat
    /// traffic so time-sensitive transactional messages are not starved.
    pub const fn priority(self) -> Priority {
        match self {
            Self::Offer => Priority::High,
            Self::Text | Self::System => Priority::Normal,
        }
    }
}

/// Lightweight sender fields carried with every delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderSummary {
    pub user_id: Uuid,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A chat message handed to the pipeline by the domain layer.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub chat_id: Uuid,
    pub recipient_id: Uuid,
    pub sender: SenderSummary,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
}

/// A queued delivery job as it travels through the Redis work queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub recipient_id: Uuid,
    pub sender: SenderSummary,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    pub attempt: u32,
}

/// Acknowledgement returned to the producer.
#[derive(Debug, Clone, Serialize)]
pub struct Queued {
    pub accepted: bool,
    pub job_id: Uuid,
}

/// Terminal state of a processed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Pushed over the recipient's live connection.
    DeliveredLive,
    /// Appended to the recipient's offline queue.
    QueuedOffline,
    /// Suppressed: a delivery receipt for this job already exists.
    Duplicate,
}

/// One pending message in a recipient's offline queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineMessage {
    pub chat_id: Uuid,
    pub sender: SenderSummary,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub queued_at: DateTime<Utc>,
}

impl OfflineMessage {
    /// Whether this entry has outlived the offline horizon.
    pub fn is_expired(&self, ttl_secs: i64, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.queued_at).num_seconds() > ttl_secs
    }
}

/// The payload pushed to the gateway for a live recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveMessage {
    pub chat_id: Uuid,
    pub sender: SenderSummary,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub sent_at: DateTime<Utc>,
    pub was_offline: bool,
}

/// Result of an offline-queue replay.
#[derive(Debug, Clone, Serialize)]
pub struct Replayed {
    pub delivered: usize,
    /// Traceability id for this replay invocation.
    pub job_id: Uuid,
}

/// Message delivery errors.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Presence(#[from] PresenceError),
    /// No gateway is listening on the recipient's channel.
    #[error("Recipient has no live connection")]
    NoLiveConnection,
}
