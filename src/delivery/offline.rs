//! Offline Message Store
//!
//! Per-recipient Redis lists holding messages pending delivery until the
//! recipient reconnects. The list key carries the offline horizon as its
//! TTL (refreshed on append); individual entries are additionally
//! timestamp-filtered at read time so an old entry never rides along on a
//! recently refreshed key.

use chrono::Utc;
use fred::prelude::*;
use tracing::debug;
use uuid::Uuid;

use super::types::{DeliveryError, OfflineMessage};

/// Offline store service.
pub struct OfflineStore {
    redis: Client,
    ttl_secs: i64,
}

impl OfflineStore {
    pub const fn new(redis: Client, ttl_secs: i64) -> Self {
        Self { redis, ttl_secs }
    }

    fn queue_key(recipient_id: Uuid) -> String {
        format!("offline:{recipient_id}")
    }

    pub const fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Append a message to the recipient's queue, refreshing the horizon.
    pub async fn append(
        &self,
        recipient_id: Uuid,
        message: &OfflineMessage,
    ) -> Result<(), DeliveryError> {
        let key = Self::queue_key(recipient_id);
        let payload = serde_json::to_string(message)
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        let _: i64 = self
            .redis
            .rpush(&key, payload)
            .await
            .map_err(|e| DeliveryError::Redis(e.to_string()))?;

        let _: bool = self
            .redis
            .expire(&key, self.ttl_secs, None)
            .await
            .map_err(|e| DeliveryError::Redis(e.to_string()))?;

        debug!(recipient_id = %recipient_id, "Message queued offline");
        Ok(())
    }

    /// Read the pending entries in enqueue order.
    ///
    /// Returns the fresh (unexpired) entries plus the raw list length, so
    /// a later [`Self::trim`] can remove exactly the snapshot it covers
    /// while preserving entries appended afterwards.
    pub async fn snapshot(
        &self,
        recipient_id: Uuid,
    ) -> Result<(Vec<OfflineMessage>, usize), DeliveryError> {
        let raw: Vec<String> = self
            .redis
            .lrange(Self::queue_key(recipient_id), 0, -1)
            .await
            .map_err(|e| DeliveryError::Redis(e.to_string()))?;

        let raw_len = raw.len();
        let now = Utc::now();
        let mut fresh = Vec::with_capacity(raw_len);
        for item in &raw {
            let entry: OfflineMessage = serde_json::from_str(item)
                .map_err(|e| DeliveryError::Serialization(e.to_string()))?;
            // Entries past the horizon are silently discarded at trim time.
            if !entry.is_expired(self.ttl_secs, now) {
                fresh.push(entry);
            }
        }

        Ok((fresh, raw_len))
    }

    /// Drop the first `count` entries (the replayed snapshot). Entries
    /// appended after the snapshot survive; an emptied list key is removed
    /// by Redis itself.
    pub async fn trim(&self, recipient_id: Uuid, count: usize) -> Result<(), DeliveryError> {
        let _: () = self
            .redis
            .ltrim(Self::queue_key(recipient_id), count as i64, -1)
            .await
            .map_err(|e| DeliveryError::Redis(e.to_string()))?;

        debug!(recipient_id = %recipient_id, count, "Offline queue drained");
        Ok(())
    }
}
