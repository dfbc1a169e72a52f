//! Webhook Database Queries
//!
//! All webhook-related database operations.
//! Uses runtime queries (`sqlx::query` / `sqlx::query_as`) to avoid
//! requiring a live database at compile time.

use sqlx::PgPool;
use uuid::Uuid;

use super::types::{DeadLetter, DeliveryLogEntry, Subscription, SubscriptionStats, SubscriptionView};

const VIEW_COLUMNS: &str = "id, owner_id, url, events, enabled, description, \
     max_attempts, timeout_secs, created_at, updated_at";

/// Create a subscription.
#[allow(clippy::too_many_arguments)]
pub async fn create_subscription(
    pool: &PgPool,
    owner_id: Uuid,
    url: &str,
    signing_secret: &str,
    events: &[String],
    description: Option<&str>,
    max_attempts: i32,
    timeout_secs: i32,
) -> sqlx::Result<Uuid> {
    let row: (Uuid,) = sqlx::query_as(
        r"
        INSERT INTO webhook_subscriptions
            (owner_id, url, signing_secret, events, description, max_attempts, timeout_secs)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        ",
    )
    .bind(owner_id)
    .bind(url)
    .bind(signing_secret)
    .bind(events)
    .bind(description)
    .bind(max_attempts)
    .bind(timeout_secs)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// List subscriptions for an owner (no signing secret returned).
pub async fn list_for_owner(pool: &PgPool, owner_id: Uuid) -> sqlx::Result<Vec<SubscriptionView>> {
    sqlx::query_as::<_, SubscriptionView>(&format!(
        r"
        SELECT {VIEW_COLUMNS}
        FROM webhook_subscriptions
        WHERE owner_id = $1
        ORDER BY created_at ASC
        "
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

/// Get a single subscription view, ownership-scoped (no signing secret).
pub async fn get_view(
    pool: &PgPool,
    subscription_id: Uuid,
    owner_id: Uuid,
) -> sqlx::Result<Option<SubscriptionView>> {
    sqlx::query_as::<_, SubscriptionView>(&format!(
        r"
        SELECT {VIEW_COLUMNS}
        FROM webhook_subscriptions
        WHERE id = $1 AND owner_id = $2
        "
    ))
    .bind(subscription_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
}

/// Get a full subscription including signing secret (for delivery).
pub async fn get_full(pool: &PgPool, subscription_id: Uuid) -> sqlx::Result<Option<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        r"
        SELECT id, owner_id, url, signing_secret, events, enabled, description,
               max_attempts, timeout_secs, created_at, updated_at
        FROM webhook_subscriptions
        WHERE id = $1
        ",
    )
    .bind(subscription_id)
    .fetch_optional(pool)
    .await
}

/// Partial update, ownership-scoped. `new_secret` replaces the signing
/// secret when present (rotation).
#[allow(clippy::too_many_arguments, clippy::option_option)]
pub async fn update_subscription(
    pool: &PgPool,
    subscription_id: Uuid,
    owner_id: Uuid,
    url: Option<&str>,
    events: Option<&[String]>,
    enabled: Option<bool>,
    description: Option<Option<&str>>,
    max_attempts: Option<i32>,
    timeout_secs: Option<i32>,
    new_secret: Option<&str>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r"
        UPDATE webhook_subscriptions
        SET url = COALESCE($3, url),
            events = COALESCE($4, events),
            enabled = COALESCE($5, enabled),
            description = CASE WHEN $6 THEN $7 ELSE description END,
            max_attempts = COALESCE($8, max_attempts),
            timeout_secs = COALESCE($9, timeout_secs),
            signing_secret = COALESCE($10, signing_secret),
            updated_at = NOW()
        WHERE id = $1 AND owner_id = $2
        ",
    )
    .bind(subscription_id)
    .bind(owner_id)
    .bind(url)
    .bind(events)
    .bind(enabled)
    .bind(description.is_some())
    .bind(description.flatten())
    .bind(max_attempts)
    .bind(timeout_secs)
    .bind(new_secret)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a subscription, ownership-scoped.
pub async fn delete_subscription(
    pool: &PgPool,
    subscription_id: Uuid,
    owner_id: Uuid,
) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM webhook_subscriptions WHERE id = $1 AND owner_id = $2")
        .bind(subscription_id)
        .bind(owner_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Count subscriptions for an owner.
pub async fn count_for_owner(pool: &PgPool, owner_id: Uuid) -> sqlx::Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM webhook_subscriptions WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(pool)
            .await?;

    Ok(row.0)
}

/// Find enabled subscriptions whose pattern set contains the event type or
/// the wildcard, optionally scoped to one owner.
pub async fn resolve_for_event(
    pool: &PgPool,
    event_type: &str,
    owner_filter: Option<Uuid>,
) -> sqlx::Result<Vec<Subscription>> {
    sqlx::query_as::<_, Subscription>(
        r"
        SELECT id, owner_id, url, signing_secret, events, enabled, description,
               max_attempts, timeout_secs, created_at, updated_at
        FROM webhook_subscriptions
        WHERE enabled = true
          AND ($2::uuid IS NULL OR owner_id = $2)
          AND ('*' = ANY(events) OR $1 = ANY(events))
        ",
    )
    .bind(event_type)
    .bind(owner_filter)
    .fetch_all(pool)
    .await
}

/// Count matching subscriptions that are disabled (skipped by dispatch).
pub async fn count_disabled_for_event(
    pool: &PgPool,
    event_type: &str,
    owner_filter: Option<Uuid>,
) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r"
        SELECT COUNT(*)
        FROM webhook_subscriptions
        WHERE enabled = false
          AND ($2::uuid IS NULL OR owner_id = $2)
          AND ('*' = ANY(events) OR $1 = ANY(events))
        ",
    )
    .bind(event_type)
    .bind(owner_filter)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Record the terminal outcome of a dispatch for a subscription.
///
/// Single atomic UPDATE: counters, last-call fields, and the running
/// latency average are folded together so concurrent dispatches never
/// read-modify-write.
pub async fn record_outcome(
    pool: &PgPool,
    subscription_id: Uuid,
    success: bool,
    latency_ms: f64,
) -> sqlx::Result<()> {
    sqlx::query(
        r"
        UPDATE webhook_subscriptions
        SET total_calls = total_calls + 1,
            success_count = success_count + CASE WHEN $2 THEN 1 ELSE 0 END,
            failure_count = failure_count + CASE WHEN $2 THEN 0 ELSE 1 END,
            last_called_at = NOW(),
            last_outcome = CASE WHEN $2 THEN 'success' ELSE 'failure' END,
            avg_latency_ms = (avg_latency_ms * total_calls + $3) / (total_calls + 1)
        WHERE id = $1
        ",
    )
    .bind(subscription_id)
    .bind(success)
    .bind(latency_ms)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch cumulative statistics for a subscription, ownership-scoped.
pub async fn get_stats(
    pool: &PgPool,
    subscription_id: Uuid,
    owner_id: Uuid,
) -> sqlx::Result<Option<SubscriptionStats>> {
    sqlx::query_as::<_, SubscriptionStats>(
        r"
        SELECT id, total_calls, success_count, failure_count,
               last_called_at, last_outcome, avg_latency_ms
        FROM webhook_subscriptions
        WHERE id = $1 AND owner_id = $2
        ",
    )
    .bind(subscription_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
}

/// Log a delivery attempt.
#[allow(clippy::too_many_arguments)]
pub async fn log_delivery(
    pool: &PgPool,
    webhook_id: Uuid,
    event_type: &str,
    event_id: Uuid,
    response_status: Option<i16>,
    success: bool,
    attempt: i32,
    error_message: Option<&str>,
    latency_ms: Option<i32>,
) -> sqlx::Result<()> {
    sqlx::query(
        r"
        INSERT INTO webhook_delivery_log
            (webhook_id, event_type, event_id, response_status, success, attempt, error_message, latency_ms)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(webhook_id)
    .bind(event_type)
    .bind(event_id)
    .bind(response_status)
    .bind(success)
    .bind(attempt)
    .bind(error_message)
    .bind(latency_ms)
    .execute(pool)
    .await?;

    Ok(())
}

/// List recent delivery log entries for a subscription.
pub async fn list_deliveries(
    pool: &PgPool,
    webhook_id: Uuid,
    limit: i64,
) -> sqlx::Result<Vec<DeliveryLogEntry>> {
    sqlx::query_as::<_, DeliveryLogEntry>(
        r"
        SELECT id, webhook_id, event_type, event_id, response_status, success,
               attempt, error_message, latency_ms, created_at
        FROM webhook_delivery_log
        WHERE webhook_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        ",
    )
    .bind(webhook_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Insert a dead letter entry.
#[allow(clippy::too_many_arguments)]
pub async fn insert_dead_letter(
    pool: &PgPool,
    webhook_id: Uuid,
    owner_id: Uuid,
    url: &str,
    event_type: &str,
    event_id: Uuid,
    payload: &serde_json::Value,
    attempts: i32,
    last_error: Option<&str>,
    response_status: Option<i16>,
    response_body: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query(
        r"
        INSERT INTO webhook_dead_letters
            (webhook_id, owner_id, url, event_type, event_id, payload,
             attempts, last_error, response_status, response_body)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ",
    )
    .bind(webhook_id)
    .bind(owner_id)
    .bind(url)
    .bind(event_type)
    .bind(event_id)
    .bind(payload)
    .bind(attempts)
    .bind(last_error)
    .bind(response_status)
    .bind(response_body)
    .execute(pool)
    .await?;

    Ok(())
}

/// List dead letters, optionally filtered by subscription ids.
pub async fn list_dead_letters(
    pool: &PgPool,
    subscription_ids: Option<&[Uuid]>,
    limit: i64,
) -> sqlx::Result<Vec<DeadLetter>> {
    sqlx::query_as::<_, DeadLetter>(
        r"
        SELECT id, webhook_id, owner_id, url, event_type, event_id, payload,
               attempts, last_error, response_status, response_body, created_at
        FROM webhook_dead_letters
        WHERE ($1::uuid[] IS NULL OR webhook_id = ANY($1))
        ORDER BY created_at ASC
        LIMIT $2
        ",
    )
    .bind(subscription_ids)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Remove a dead letter after a successful manual retry.
pub async fn delete_dead_letter(pool: &PgPool, dead_letter_id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM webhook_dead_letters WHERE id = $1")
        .bind(dead_letter_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Current dead-letter backlog size (health reporting).
pub async fn count_dead_letters(pool: &PgPool) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM webhook_dead_letters")
        .fetch_one(pool)
        .await?;

    Ok(row.0)
}

/// Delete delivery log entries older than `retention_days`.
pub async fn cleanup_old_delivery_logs(pool: &PgPool, retention_days: i32) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "DELETE FROM webhook_delivery_log WHERE created_at < NOW() - make_interval(days => $1)",
    )
    .bind(retention_days)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete dead letter entries older than `retention_days`.
pub async fn cleanup_old_dead_letters(pool: &PgPool, retention_days: i32) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "DELETE FROM webhook_dead_letters WHERE created_at < NOW() - make_interval(days => $1)",
    )
    .bind(retention_days)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Cheap reachability probe used by health checks.
pub async fn ping(pool: &PgPool) -> sqlx::Result<()> {
    let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
