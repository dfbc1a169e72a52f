//! Webhook delivery integration tests.
//!
//! Exercise the full dispatch path against live Postgres and a local
//! scripted target endpoint: retry-until-success statistics, dead-letter
//! creation on exhaustion, and manual dead-letter retry.

mod helpers;

use std::sync::Arc;

use serial_test::serial;
use uuid::Uuid;

use agora_relay::events::{ConnectionPayload, DomainEvent};
use agora_relay::webhooks::types::{RegisterRequest, RegisteredSubscription, RetryResult};
use agora_relay::webhooks::{queries, WebhookDispatcher, WebhookRegistry};

use helpers::WebhookReceiver;

async fn register_target(
    registry: &WebhookRegistry,
    owner: Uuid,
    url: &str,
) -> RegisteredSubscription {
    registry
        .register(
            owner,
            RegisterRequest {
                url: url.to_string(),
                events: vec!["user.connected".to_string()],
                description: None,
                signing_secret: None,
                max_attempts: Some(3),
                timeout_secs: Some(2),
            },
        )
        .await
        .expect("register subscription")
}

fn connected_event() -> DomainEvent {
    DomainEvent::UserConnected(ConnectionPayload {
        user_id: Uuid::now_v7(),
        connection_id: "conn-1".to_string(),
    })
}

async fn cleanup_owner(pool: &sqlx::PgPool, owner: Uuid) {
    sqlx::query("DELETE FROM webhook_subscriptions WHERE owner_id = $1")
        .bind(owner)
        .execute(pool)
        .await
        .expect("cleanup subscriptions");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn transient_failures_then_success_update_stats_once() {
    let Some(pool) = helpers::shared_pool().await else {
        return;
    };
    let config = helpers::test_config();
    let receiver = WebhookReceiver::start(vec![500, 503, 200]).await;

    let registry = Arc::new(WebhookRegistry::new(pool.clone(), &config));
    let dispatcher = WebhookDispatcher::new(registry.clone());

    let owner = Uuid::now_v7();
    let registered = register_target(&registry, owner, &receiver.url).await;

    let summary = dispatcher
        .dispatch(&connected_event(), Some(owner))
        .await
        .expect("dispatch");

    assert_eq!(summary.triggered, 1);
    assert_eq!(summary.failed, 0);
    assert!(summary.outcomes[0].success);
    assert_eq!(summary.outcomes[0].attempts, 3);
    assert_eq!(receiver.hits(), 3);

    // Exactly one statistics update for the whole dispatch.
    let stats = registry
        .stats(registered.subscription.id, owner)
        .await
        .expect("stats");
    assert_eq!(stats.total_calls, 1);
    assert_eq!(stats.success_count, 1);
    assert_eq!(stats.failure_count, 0);
    assert_eq!(stats.last_outcome.as_deref(), Some("success"));

    // A delivery that eventually succeeded leaves no dead letter.
    let dead = queries::list_dead_letters(pool, Some(&[registered.subscription.id]), 10)
        .await
        .expect("list dead letters");
    assert!(dead.is_empty());

    cleanup_owner(pool, owner).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn exhausted_delivery_dead_letters_and_manual_retry_clears_it() {
    let Some(pool) = helpers::shared_pool().await else {
        return;
    };
    let config = helpers::test_config();
    // Three failing attempts; the endpoint recovers for the manual retry.
    let receiver = WebhookReceiver::start(vec![500, 500, 500, 200]).await;

    let registry = Arc::new(WebhookRegistry::new(pool.clone(), &config));
    let dispatcher = WebhookDispatcher::new(registry.clone());

    let owner = Uuid::now_v7();
    let registered = register_target(&registry, owner, &receiver.url).await;
    let sub_id = registered.subscription.id;

    let summary = dispatcher
        .dispatch(&connected_event(), Some(owner))
        .await
        .expect("dispatch");

    assert_eq!(summary.triggered, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.outcomes[0].attempts, 3);

    let dead = queries::list_dead_letters(pool, Some(&[sub_id]), 10)
        .await
        .expect("list dead letters");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(dead[0].response_status, Some(500));

    let stats = registry.stats(sub_id, owner).await.expect("stats");
    assert_eq!(stats.total_calls, 1);
    assert_eq!(stats.failure_count, 1);

    let outcomes = dispatcher
        .retry_dead_letters(Some(&[sub_id]))
        .await
        .expect("retry dead letters");
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        outcomes[0].result,
        RetryResult::Delivered {
            response_status: 200
        }
    ));

    // A successful redelivery removes the record.
    let dead = queries::list_dead_letters(pool, Some(&[sub_id]), 10)
        .await
        .expect("list dead letters");
    assert!(dead.is_empty());

    cleanup_owner(pool, owner).await;
}
