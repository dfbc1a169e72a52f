//! Presence Directory
//!
//! Redis-backed soft state tracking which users hold a live connection.
//! Sessions live under TTL'd keys; a sorted-set index scored by last-seen
//! supports counting and stale sweeps. Loss of this state is tolerable: a
//! missing session simply reads as offline.

use chrono::Utc;
use fred::prelude::*;
use tracing::debug;
use uuid::Uuid;

use super::types::{PresenceError, Session, SessionProfile};

/// Sorted-set index of online users, scored by last-seen Unix timestamp.
const INDEX_KEY: &str = "presence:index";

/// Presence directory service.
pub struct PresenceDirectory {
    redis: Client,
    /// Soft-expiry horizon in seconds; a session idle longer reads as offline.
    ttl_secs: i64,
}

impl PresenceDirectory {
    pub const fn new(redis: Client, ttl_secs: i64) -> Self {
        Self { redis, ttl_secs }
    }

    fn session_key(user_id: Uuid) -> String {
        format!("presence:session:{user_id}")
    }

    /// Record or replace the session for a user. Idempotent; a reconnect
    /// supersedes any prior session (last-writer-wins, single active
    /// connection per user).
    pub async fn mark_online(
        &self,
        user_id: Uuid,
        connection_id: &str,
        profile: SessionProfile,
    ) -> Result<(), PresenceError> {
        let now = Utc::now();
        let session = Session {
            user_id,
            connection_id: connection_id.to_string(),
            last_seen: now,
            profile,
        };
        let payload = serde_json::to_string(&session)
            .map_err(|e| PresenceError::Serialization(e.to_string()))?;

        let _: () = self
            .redis
            .set(
                Self::session_key(user_id),
                payload,
                Some(Expiration::EX(self.ttl_secs)),
                None,
                false,
            )
            .await
            .map_err(|e| PresenceError::Redis(e.to_string()))?;

        let _: () = self
            .redis
            .zadd(
                INDEX_KEY,
                None,
                None,
                false,
                false,
                (now.timestamp() as f64, user_id.to_string()),
            )
            .await
            .map_err(|e| PresenceError::Redis(e.to_string()))?;

        debug!(user_id = %user_id, connection_id, "Presence session recorded");
        Ok(())
    }

    /// Remove the session. Safe to call when absent.
    pub async fn mark_offline(&self, user_id: Uuid) -> Result<(), PresenceError> {
        let _: i64 = self
            .redis
            .del(Self::session_key(user_id))
            .await
            .map_err(|e| PresenceError::Redis(e.to_string()))?;

        let _: i64 = self
            .redis
            .zrem(INDEX_KEY, user_id.to_string())
            .await
            .map_err(|e| PresenceError::Redis(e.to_string()))?;

        debug!(user_id = %user_id, "Presence session removed");
        Ok(())
    }

    /// Refresh a session's last-seen timestamp. No-op for offline users.
    pub async fn touch(&self, user_id: Uuid) -> Result<(), PresenceError> {
        let Some(mut session) = self.get_session(user_id).await? else {
            return Ok(());
        };

        session.last_seen = Utc::now();
        let payload = serde_json::to_string(&session)
            .map_err(|e| PresenceError::Serialization(e.to_string()))?;

        let _: () = self
            .redis
            .set(
                Self::session_key(user_id),
                payload,
                Some(Expiration::EX(self.ttl_secs)),
                None,
                false,
            )
            .await
            .map_err(|e| PresenceError::Redis(e.to_string()))?;

        let _: () = self
            .redis
            .zadd(
                INDEX_KEY,
                None,
                None,
                false,
                false,
                (session.last_seen.timestamp() as f64, user_id.to_string()),
            )
            .await
            .map_err(|e| PresenceError::Redis(e.to_string()))?;

        Ok(())
    }

    /// Whether the user currently holds a live, unexpired session.
    pub async fn is_online(&self, user_id: Uuid) -> Result<bool, PresenceError> {
        Ok(self.get_session(user_id).await?.is_some())
    }

    /// Fetch the session for a user. Absent (not an error) for unknown
    /// users and for sessions past the soft-expiry horizon.
    pub async fn get_session(&self, user_id: Uuid) -> Result<Option<Session>, PresenceError> {
        let payload: Option<String> = self
            .redis
            .get(Self::session_key(user_id))
            .await
            .map_err(|e| PresenceError::Redis(e.to_string()))?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        let session: Session = serde_json::from_str(&payload)
            .map_err(|e| PresenceError::Serialization(e.to_string()))?;

        // The key TTL normally enforces the horizon; this also covers a
        // session written with a longer TTL by an older configuration.
        if session.is_stale(self.ttl_secs, Utc::now()) {
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Remove index entries whose last-seen is past the soft-expiry
    /// horizon. Returns the number removed.
    pub async fn sweep_stale(&self) -> Result<i64, PresenceError> {
        let cutoff = (Utc::now().timestamp() - self.ttl_secs) as f64;

        self.redis
            .zremrangebyscore(INDEX_KEY, f64::NEG_INFINITY, cutoff)
            .await
            .map_err(|e| PresenceError::Redis(e.to_string()))
    }

    /// Count users with an unexpired session, sweeping the stale tail of
    /// the index first.
    pub async fn count_online(&self) -> Result<i64, PresenceError> {
        self.sweep_stale().await?;

        self.redis
            .zcard(INDEX_KEY)
            .await
            .map_err(|e| PresenceError::Redis(e.to_string()))
    }
}
