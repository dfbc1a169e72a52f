//! Presence session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Denormalized profile fields carried in presence responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A live connection session.
///
/// Soft state: at most one per user, superseded by reconnects
/// (last-writer-wins), treated as offline once `last_seen` passes the
/// soft-expiry horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    pub connection_id: String,
    pub last_seen: DateTime<Utc>,
    pub profile: SessionProfile,
}

impl Session {
    /// Whether this session is past the soft-expiry horizon.
    pub fn is_stale(&self, ttl_secs: i64, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_seen).num_seconds() > ttl_secs
    }
}

/// Presence errors.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(last_seen: DateTime<Utc>) -> Session {
        Session {
            user_id: Uuid::nil(),
            connection_id: "conn-1".to_string(),
            last_seen,
            profile: SessionProfile {
                display_name: "Mika".to_string(),
                avatar_url: None,
            },
        }
    }

    #[test]
    fn fresh_session_is_not_stale() {
        let now = Utc::now();
        assert!(!session(now).is_stale(86400, now));
    }

    #[test]
    fn session_past_horizon_is_stale() {
        let now = Utc::now();
        let s = session(now - Duration::hours(25));
        assert!(s.is_stale(86400, now));
    }

    #[test]
    fn session_serialization_skips_missing_avatar() {
        let json = serde_json::to_string(&session(Utc::now())).unwrap();
        assert!(!json.contains("avatar_url"));
        assert!(json.contains("\"display_name\":\"Mika\""));
    }
}
