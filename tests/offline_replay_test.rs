//! Presence and offline-replay integration tests against live Redis.
//!
//! A second Redis connection stands in for the gateway: it subscribes to
//! the recipient's inbox channel and receives what the pipeline pushes.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use fred::prelude::*;
use serial_test::serial;
use uuid::Uuid;

use agora_relay::delivery::types::{CompletionOutcome, DeliveryJob, MessageKind, SenderSummary};
use agora_relay::delivery::{LivePush, MessagePipeline, OfflineStore};
use agora_relay::presence::{PresenceDirectory, SessionProfile};

fn text_job(recipient_id: Uuid) -> DeliveryJob {
    DeliveryJob {
        id: Uuid::now_v7(),
        chat_id: Uuid::now_v7(),
        recipient_id,
        sender: SenderSummary {
            user_id: Uuid::now_v7(),
            display_name: "Ana".to_string(),
            avatar_url: None,
        },
        kind: MessageKind::Text,
        payload: serde_json::json!({"body": "hej"}),
        enqueued_at: chrono::Utc::now(),
        attempt: 0,
    }
}

fn profile() -> SessionProfile {
    SessionProfile {
        display_name: "Mika".to_string(),
        avatar_url: None,
    }
}

fn build_pipeline(redis: &Client, presence: Arc<PresenceDirectory>) -> MessagePipeline {
    let config = helpers::test_config();
    MessagePipeline::new(
        redis.clone(),
        presence,
        LivePush::new(redis.clone()),
        OfflineStore::new(redis.clone(), config.offline_ttl_secs),
        config.receipt_ttl_secs,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn offline_message_queues_then_replays_on_reconnect() {
    let Some(redis) = helpers::shared_redis().await else {
        return;
    };
    let config = helpers::test_config();
    let recipient = Uuid::now_v7();

    let presence = Arc::new(PresenceDirectory::new(
        redis.clone(),
        config.presence_ttl_secs,
    ));
    let pipeline = build_pipeline(redis, presence.clone());

    // Recipient offline: the job lands in the offline queue.
    let outcome = pipeline
        .process_job(text_job(recipient))
        .await
        .expect("process job");
    assert_eq!(outcome, CompletionOutcome::QueuedOffline);

    let pending = pipeline
        .get_offline_messages(recipient)
        .await
        .expect("offline snapshot");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload["body"], "hej");

    // Reconnect: a gateway stand-in listens on the inbox channel.
    let Some(subscriber) = helpers::connect_redis().await else {
        return;
    };
    let mut inbox = subscriber.message_rx();
    subscriber
        .subscribe(LivePush::inbox_channel(recipient))
        .await
        .expect("subscribe inbox");

    presence
        .mark_online(recipient, "conn-1", profile())
        .await
        .expect("mark online");

    let replayed = pipeline
        .deliver_offline_messages(recipient)
        .await
        .expect("replay");
    assert_eq!(replayed.delivered, 1);

    let message = tokio::time::timeout(Duration::from_secs(5), inbox.recv())
        .await
        .expect("replayed message timed out")
        .expect("inbox subscription closed");
    let payload: String = message.value.convert().expect("string payload");
    let live: serde_json::Value = serde_json::from_str(&payload).expect("json payload");
    assert_eq!(live["was_offline"], true);
    assert_eq!(live["payload"]["body"], "hej");

    // A full successful replay drains the queue.
    let pending = pipeline
        .get_offline_messages(recipient)
        .await
        .expect("offline snapshot");
    assert!(pending.is_empty());

    presence.mark_offline(recipient).await.expect("cleanup");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn live_delivery_records_receipt_and_suppresses_duplicates() {
    let Some(redis) = helpers::shared_redis().await else {
        return;
    };
    let config = helpers::test_config();
    let recipient = Uuid::now_v7();

    let presence = Arc::new(PresenceDirectory::new(
        redis.clone(),
        config.presence_ttl_secs,
    ));
    let pipeline = build_pipeline(redis, presence.clone());

    let Some(subscriber) = helpers::connect_redis().await else {
        return;
    };
    let mut inbox = subscriber.message_rx();
    subscriber
        .subscribe(LivePush::inbox_channel(recipient))
        .await
        .expect("subscribe inbox");

    presence
        .mark_online(recipient, "conn-1", profile())
        .await
        .expect("mark online");

    let job = text_job(recipient);
    let outcome = pipeline.process_job(job.clone()).await.expect("process job");
    assert_eq!(outcome, CompletionOutcome::DeliveredLive);

    let message = tokio::time::timeout(Duration::from_secs(5), inbox.recv())
        .await
        .expect("live message timed out")
        .expect("inbox subscription closed");
    let payload: String = message.value.convert().expect("string payload");
    let live: serde_json::Value = serde_json::from_str(&payload).expect("json payload");
    assert_eq!(live["was_offline"], false);

    // Re-processing the same job within the receipt window is suppressed.
    let outcome = pipeline.process_job(job).await.expect("process duplicate");
    assert_eq!(outcome, CompletionOutcome::Duplicate);

    presence.mark_offline(recipient).await.expect("cleanup");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn presence_lookups_are_total() {
    let Some(redis) = helpers::shared_redis().await else {
        return;
    };
    let config = helpers::test_config();
    let presence = PresenceDirectory::new(redis.clone(), config.presence_ttl_secs);
    let ghost = Uuid::now_v7();

    // Unknown users read as absent, never as an error.
    assert!(presence.get_session(ghost).await.expect("get").is_none());
    assert!(!presence.is_online(ghost).await.expect("is_online"));

    // mark_offline is idempotent.
    presence.mark_offline(ghost).await.expect("first offline");
    presence.mark_offline(ghost).await.expect("second offline");
}
