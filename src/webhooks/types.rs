//! Webhook Types
//!
//! Data structures for subscriptions, delivery outcomes, and dead letters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Webhook subscription row (includes signing secret for delivery).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub url: String,
    pub signing_secret: String,
    pub events: Vec<String>,
    pub enabled: bool,
    pub description: Option<String>,
    pub max_attempts: i32,
    pub timeout_secs: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Subscription view returned from read endpoints (secret redacted).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SubscriptionView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub url: String,
    pub events: Vec<String>,
    pub enabled: bool,
    pub description: Option<String>,
    pub max_attempts: i32,
    pub timeout_secs: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response returned on registration or secret rotation.
///
/// The only places the signing secret ever leaves the registry.
#[derive(Debug, Serialize)]
pub struct RegisteredSubscription {
    #[serde(flatten)]
    pub subscription: SubscriptionView,
    pub signing_secret: String,
}

/// Request to register a subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub url: String,
    pub events: Vec<String>,
    pub description: Option<String>,
    /// Caller-supplied secret; generated when absent.
    pub signing_secret: Option<String>,
    pub max_attempts: Option<i32>,
    pub timeout_secs: Option<i32>,
}

/// Partial update for a subscription.
///
/// `description` is a double option: an absent field leaves the value
/// unchanged, an explicit `null` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionPatch {
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub max_attempts: Option<i32>,
    pub timeout_secs: Option<i32>,
    /// Regenerate the signing secret and return it once.
    #[serde(default)]
    pub rotate_secret: bool,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

/// Result of an update; carries the new secret only after rotation.
#[derive(Debug, Serialize)]
pub struct UpdatedSubscription {
    #[serde(flatten)]
    pub subscription: SubscriptionView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,
}

/// Cumulative delivery statistics for a subscription.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SubscriptionStats {
    pub id: Uuid,
    pub total_calls: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_called_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<String>,
    pub avg_latency_ms: f64,
}

/// Dead letter row: a delivery that exhausted its retry budget.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DeadLetter {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub owner_id: Uuid,
    pub url: String,
    pub event_type: String,
    pub event_id: Uuid,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub response_status: Option<i16>,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Delivery log entry (per-attempt audit trail).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DeliveryLogEntry {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_type: String,
    pub event_id: Uuid,
    pub response_status: Option<i16>,
    pub success: bool,
    pub attempt: i32,
    pub error_message: Option<String>,
    pub latency_ms: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Terminal outcome for one subscription within a dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub subscription_id: Uuid,
    pub success: bool,
    pub attempts: u32,
    pub response_status: Option<u16>,
    pub error: Option<String>,
}

/// Summary of a dispatch fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummary {
    pub event_type: String,
    pub event_id: Uuid,
    /// Subscriptions that were attempted.
    pub triggered: usize,
    /// Attempted subscriptions whose delivery ultimately failed.
    pub failed: usize,
    /// Matching subscriptions skipped because they are disabled.
    pub skipped_disabled: usize,
    pub outcomes: Vec<DeliveryOutcome>,
}

/// Outcome of a manual dead-letter retry.
#[derive(Debug, Clone, Serialize)]
pub struct RetryOutcome {
    pub dead_letter_id: Uuid,
    pub webhook_id: Uuid,
    pub result: RetryResult,
}

/// Result variants for a dead-letter retry.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetryResult {
    /// Delivered; the dead letter was removed.
    Delivered { response_status: u16 },
    /// Delivery failed again; the dead letter was kept.
    Failed { error: String },
    /// Subscription has since been disabled or deleted.
    Skipped,
}

/// Manual test delivery result.
#[derive(Debug, Serialize)]
pub struct TestDeliveryResult {
    pub success: bool,
    pub response_status: Option<u16>,
    pub latency_ms: u64,
    pub error_message: Option<String>,
}

/// Webhook errors.
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Unknown subscription, or one owned by someone else. The two cases
    /// are indistinguishable to the caller so existence is never leaked.
    #[error("Subscription not found")]
    NotFound,
    #[error("Validation: {0}")]
    Validation(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Maximum subscriptions reached for owner")]
    MaxSubscriptionsReached,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_description_distinguishes_absent_from_null() {
        let patch: SubscriptionPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(patch.description, None);

        let patch: SubscriptionPatch = serde_json::from_str(r#"{"description":null}"#).unwrap();
        assert_eq!(patch.description, Some(None));

        let patch: SubscriptionPatch =
            serde_json::from_str(r#"{"description":"prod hook"}"#).unwrap();
        assert_eq!(patch.description, Some(Some("prod hook".to_string())));
    }
}
