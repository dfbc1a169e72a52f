//! Message Work Queue
//!
//! Durable Redis queue decoupling producer latency from delivery latency.
//! Two lanes: offers jump ahead of plain chat traffic. The worker loop
//! BRPOPs across both lanes in priority order and processes each job in
//! its own task.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fred::prelude::*;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::pipeline::MessagePipeline;
use super::types::{DeliveryError, DeliveryJob, NewMessage, Priority, Queued};

/// Redis key for the elevated-priority lane (offers/negotiation).
const HIGH_QUEUE_KEY: &str = "delivery:queue:high";

/// Redis key for the normal lane.
const NORMAL_QUEUE_KEY: &str = "delivery:queue:normal";

/// BRPOP timeout; short so the loop stays responsive to shutdown.
const POP_TIMEOUT_SECS: f64 = 2.0;

/// Total processing attempts a job gets before it is abandoned.
const MAX_JOB_ATTEMPTS: u32 = 5;

/// Delay before re-enqueueing a job that has failed `failed_attempts`
/// times, or `None` once the redelivery budget is spent.
fn next_redelivery_delay(failed_attempts: u32) -> Option<Duration> {
    if failed_attempts >= MAX_JOB_ATTEMPTS {
        None
    } else {
        Some(Duration::from_secs(1 << failed_attempts.min(6)))
    }
}

/// Queue lane for a priority.
const fn queue_key_for(priority: Priority) -> &'static str {
    match priority {
        Priority::High => HIGH_QUEUE_KEY,
        Priority::Normal => NORMAL_QUEUE_KEY,
    }
}

/// Producer-side handle to the work queue.
pub struct MessageQueue {
    redis: Client,
}

impl MessageQueue {
    pub const fn new(redis: Client) -> Self {
        Self { redis }
    }

    /// Accept a message into the durable queue. Never delivers inline; a
    /// store failure surfaces immediately so the caller can log it.
    pub async fn enqueue(&self, new: NewMessage) -> Result<Queued, DeliveryError> {
        let job = DeliveryJob {
            id: Uuid::now_v7(),
            chat_id: new.chat_id,
            recipient_id: new.recipient_id,
            sender: new.sender,
            kind: new.kind,
            payload: new.payload,
            enqueued_at: Utc::now(),
            attempt: 0,
        };

        let payload = serde_json::to_string(&job)
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        let _: i64 = self
            .redis
            .lpush(queue_key_for(job.kind.priority()), payload)
            .await
            .map_err(|e| DeliveryError::Redis(e.to_string()))?;

        Ok(Queued {
            accepted: true,
            job_id: job.id,
        })
    }
}

/// Run the delivery worker loop. Never returns under normal operation;
/// callers spawn it as a background task.
pub async fn run_delivery_worker(redis: Client, pipeline: Arc<MessagePipeline>) {
    info!("Message delivery worker started");

    // Track consecutive pop errors for exponential backoff
    let mut consecutive_errors: u32 = 0;

    loop {
        // BRPOP checks the high lane first, so offers are never starved
        // behind chat traffic.
        let result: Result<Option<(String, String)>, _> = redis
            .brpop(vec![HIGH_QUEUE_KEY, NORMAL_QUEUE_KEY], POP_TIMEOUT_SECS)
            .await;

        let payload_str = match result {
            Ok(Some((_key, value))) => {
                consecutive_errors = 0;
                value
            }
            Ok(None) => {
                consecutive_errors = 0;
                continue; // Timeout, no items
            }
            Err(e) => {
                consecutive_errors += 1;
                let backoff_secs = 1u64 << consecutive_errors.min(6); // 2, 4, 8, ... 64
                error!(
                    consecutive_errors,
                    backoff_secs,
                    "Failed to pop from delivery queue, backing off: {}",
                    e
                );
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                continue;
            }
        };

        let job: DeliveryJob = match serde_json::from_str(&payload_str) {
            Ok(job) => job,
            Err(e) => {
                let truncated: String = payload_str.chars().take(500).collect();
                error!(
                    error = %e,
                    payload_preview = %truncated,
                    "Failed to deserialize delivery job"
                );
                continue;
            }
        };

        let pipeline = pipeline.clone();
        let redis = redis.clone();

        // Per-job task with panic capture so one poisoned job cannot take
        // down the worker loop.
        tokio::spawn(async move {
            let job_id = job.id;
            let recipient_id = job.recipient_id;
            let handle = tokio::spawn(process_with_redelivery(redis, pipeline, job));
            if let Err(e) = handle.await {
                error!(
                    job_id = %job_id,
                    recipient_id = %recipient_id,
                    "Delivery task panicked: {}", e
                );
            }
        });
    }
}

/// Process one job; a processing failure puts the job back on its lane
/// with an incremented attempt count so a store hiccup never loses a
/// message. The redelivery budget bounds the loop; only a job that fails
/// every attempt is abandoned, loudly.
async fn process_with_redelivery(redis: Client, pipeline: Arc<MessagePipeline>, mut job: DeliveryJob) {
    let Err(e) = pipeline.process_job(job.clone()).await else {
        return;
    };

    let failed_attempts = job.attempt + 1;
    let Some(delay) = next_redelivery_delay(failed_attempts) else {
        error!(
            job_id = %job.id,
            recipient_id = %job.recipient_id,
            attempts = failed_attempts,
            "Delivery failed, redelivery budget exhausted: {}", e
        );
        return;
    };

    warn!(
        job_id = %job.id,
        recipient_id = %job.recipient_id,
        attempts = failed_attempts,
        delay_secs = delay.as_secs(),
        "Delivery failed, re-enqueueing: {}", e
    );
    tokio::time::sleep(delay).await;

    job.attempt = failed_attempts;
    if let Err(e) = requeue(&redis, &job).await {
        error!(job_id = %job.id, "Failed to re-enqueue job: {}", e);
    }
}

async fn requeue(redis: &Client, job: &DeliveryJob) -> Result<(), DeliveryError> {
    let payload =
        serde_json::to_string(job).map_err(|e| DeliveryError::Serialization(e.to_string()))?;

    let _: i64 = redis
        .lpush(queue_key_for(job.kind.priority()), payload)
        .await
        .map_err(|e| DeliveryError::Redis(e.to_string()))?;

    Ok(())
}
