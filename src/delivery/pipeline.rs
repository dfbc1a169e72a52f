//! Message Delivery Pipeline
//!
//! Routes a queued chat message to the recipient's live connection when
//! they are online, and into their offline queue otherwise. A message is
//! never silently discarded: a live push that exhausts its retry budget
//! degrades to the offline path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fred::prelude::*;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::presence::PresenceDirectory;

use super::live::LivePush;
use super::offline::OfflineStore;
use super::types::{
    CompletionOutcome, DeliveryError, DeliveryJob, LiveMessage, OfflineMessage, Replayed,
};

/// Live-push retry budget within a single job.
const LIVE_PUSH_ATTEMPTS: u32 = 3;

/// Base delay for live-push backoff; doubles per attempt (1s, 2s, 4s).
const LIVE_PUSH_BACKOFF_BASE_SECS: u64 = 1;

/// Message delivery pipeline service.
pub struct MessagePipeline {
    redis: Client,
    presence: Arc<PresenceDirectory>,
    live: LivePush,
    offline: OfflineStore,
    receipt_ttl_secs: i64,
}

impl MessagePipeline {
    pub const fn new(
        redis: Client,
        presence: Arc<PresenceDirectory>,
        live: LivePush,
        offline: OfflineStore,
        receipt_ttl_secs: i64,
    ) -> Self {
        Self {
            redis,
            presence,
            live,
            offline,
            receipt_ttl_secs,
        }
    }

    fn receipt_key(job_id: Uuid) -> String {
        format!("delivery:receipt:{job_id}")
    }

    /// Process one queued job to a terminal outcome.
    pub async fn process_job(&self, job: DeliveryJob) -> Result<CompletionOutcome, DeliveryError> {
        // Idempotent re-delivery suppression: a job that already produced
        // a receipt (e.g. re-enqueued after a worker crash) is not pushed
        // twice within the receipt window.
        if self.receipt_exists(job.id).await? {
            debug!(job_id = %job.id, "Duplicate delivery suppressed by receipt");
            return Ok(CompletionOutcome::Duplicate);
        }

        if self.presence.is_online(job.recipient_id).await? {
            let message = LiveMessage {
                chat_id: job.chat_id,
                sender: job.sender.clone(),
                kind: job.kind,
                payload: job.payload.clone(),
                sent_at: job.enqueued_at,
                was_offline: false,
            };

            match self.push_live_with_retries(job.recipient_id, &message).await {
                Ok(()) => {
                    self.record_receipt(job.id).await?;
                    info!(job_id = %job.id, recipient_id = %job.recipient_id, "Delivered live");
                    return Ok(CompletionOutcome::DeliveredLive);
                }
                Err(e) => {
                    // Exhausted the live budget; degrade to the offline
                    // queue rather than dropping the message.
                    warn!(
                        job_id = %job.id,
                        recipient_id = %job.recipient_id,
                        error = %e,
                        "Live delivery exhausted, queueing offline"
                    );
                }
            }
        }

        let entry = OfflineMessage {
            chat_id: job.chat_id,
            sender: job.sender,
            kind: job.kind,
            payload: job.payload,
            queued_at: job.enqueued_at,
        };
        self.offline.append(job.recipient_id, &entry).await?;
        info!(job_id = %job.id, recipient_id = %job.recipient_id, "Queued offline");
        Ok(CompletionOutcome::QueuedOffline)
    }

    /// Push with bounded exponential backoff, sequential attempts.
    async fn push_live_with_retries(
        &self,
        recipient_id: Uuid,
        message: &LiveMessage,
    ) -> Result<(), DeliveryError> {
        let mut last_err = None;
        for attempt in 1..=LIVE_PUSH_ATTEMPTS {
            match self.live.push(recipient_id, message).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    if attempt < LIVE_PUSH_ATTEMPTS {
                        let delay = LIVE_PUSH_BACKOFF_BASE_SECS << (attempt - 1);
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    }
                }
            }
        }
        Err(last_err.expect("at least one attempt was made"))
    }

    /// Read-only snapshot of a recipient's pending offline messages.
    pub async fn get_offline_messages(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OfflineMessage>, DeliveryError> {
        let (entries, _) = self.offline.snapshot(user_id).await?;
        Ok(entries)
    }

    /// Replay a reconnected user's offline queue over their live
    /// connection, tagged `was_offline: true`.
    ///
    /// All-or-nothing relative to persistence: the queue is trimmed only
    /// after every entry was pushed. A failure mid-replay (e.g. the user
    /// disconnected again) leaves the entries intact for the next attempt;
    /// duplicates on that next attempt are acceptable under at-least-once.
    pub async fn deliver_offline_messages(&self, user_id: Uuid) -> Result<Replayed, DeliveryError> {
        if !self.presence.is_online(user_id).await? {
            return Err(DeliveryError::NoLiveConnection);
        }

        let replay_id = Uuid::now_v7();
        let (entries, raw_len) = self.offline.snapshot(user_id).await?;
        if raw_len == 0 {
            return Ok(Replayed {
                delivered: 0,
                job_id: replay_id,
            });
        }

        let now = Utc::now();
        for entry in &entries {
            let message = LiveMessage {
                chat_id: entry.chat_id,
                sender: entry.sender.clone(),
                kind: entry.kind,
                payload: entry.payload.clone(),
                sent_at: now,
                was_offline: true,
            };
            self.live.push(user_id, &message).await?;
        }

        // Only entries covered by the snapshot are dropped; anything
        // appended during the replay stays queued.
        self.offline.trim(user_id, raw_len).await?;

        info!(
            user_id = %user_id,
            replay_id = %replay_id,
            delivered = entries.len(),
            "Offline queue replayed"
        );
        Ok(Replayed {
            delivered: entries.len(),
            job_id: replay_id,
        })
    }

    async fn receipt_exists(&self, job_id: Uuid) -> Result<bool, DeliveryError> {
        let count: i64 = self
            .redis
            .exists(Self::receipt_key(job_id))
            .await
            .map_err(|e| DeliveryError::Redis(e.to_string()))?;
        Ok(count > 0)
    }

    async fn record_receipt(&self, job_id: Uuid) -> Result<(), DeliveryError> {
        let _: () = self
            .redis
            .set(
                Self::receipt_key(job_id),
                1,
                Some(Expiration::EX(self.receipt_ttl_secs)),
                None,
                false,
            )
            .await
            .map_err(|e| DeliveryError::Redis(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_backoff_doubles_from_one_second() {
        let delays: Vec<u64> = (1..LIVE_PUSH_ATTEMPTS)
            .map(|attempt| LIVE_PUSH_BACKOFF_BASE_SECS << (attempt - 1))
            .collect();
        assert_eq!(delays, vec![1, 2]);
    }

    #[test]
    fn receipt_key_is_per_job() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        assert_ne!(MessagePipeline::receipt_key(a), MessagePipeline::receipt_key(b));
    }
}
