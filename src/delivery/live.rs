//! Live Connection Push
//!
//! Delivers a message to a connected recipient by publishing on their
//! per-user Redis channel; the gateway layer holding the websocket
//! forwards it. A publish that reaches zero subscribers means no gateway
//! is listening for that user, which callers treat as a delivery miss.

use fred::prelude::*;
use tracing::debug;
use uuid::Uuid;

use super::types::{DeliveryError, LiveMessage};

/// Live push transport over Redis pub/sub.
pub struct LivePush {
    redis: Client,
}

impl LivePush {
    pub const fn new(redis: Client) -> Self {
        Self { redis }
    }

    /// Per-user inbox channel name.
    pub fn inbox_channel(user_id: Uuid) -> String {
        format!("user:{user_id}:inbox")
    }

    /// Push a message to the recipient's live connection.
    pub async fn push(&self, recipient_id: Uuid, message: &LiveMessage) -> Result<(), DeliveryError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        let receivers: i64 = self
            .redis
            .publish(Self::inbox_channel(recipient_id), payload)
            .await
            .map_err(|e| DeliveryError::Redis(e.to_string()))?;

        if receivers == 0 {
            return Err(DeliveryError::NoLiveConnection);
        }

        debug!(recipient_id = %recipient_id, receivers, "Live message pushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_channel_is_per_user() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        assert_ne!(LivePush::inbox_channel(a), LivePush::inbox_channel(b));
        assert_eq!(LivePush::inbox_channel(a), format!("user:{a}:inbox"));
    }
}
