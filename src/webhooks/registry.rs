//! Webhook Subscription Registry
//!
//! Ownership-checked subscription management over the durable store, with a
//! short-lived per-owner list cache. Constructed explicitly and injected;
//! holds its own connection handles.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::events::{self, EventType};

use super::types::{
    RegisterRequest, RegisteredSubscription, Subscription, SubscriptionPatch, SubscriptionStats,
    SubscriptionView, UpdatedSubscription, WebhookError,
};
use super::{queries, signing, url_guard};

/// How long a cached per-owner subscription list stays fresh.
const LIST_CACHE_TTL: Duration = Duration::from_secs(30);

/// Valid range for the per-dispatch attempt budget.
const ATTEMPTS_RANGE: std::ops::RangeInclusive<i32> = 1..=10;

/// Valid range for the per-attempt timeout, in seconds.
const TIMEOUT_RANGE: std::ops::RangeInclusive<i32> = 1..=30;

/// Maximum description length.
const MAX_DESCRIPTION_LEN: usize = 500;

/// Minimum length for a caller-supplied signing secret.
const MIN_SECRET_LEN: usize = 16;

/// Subscription registry service.
pub struct WebhookRegistry {
    db: PgPool,
    list_cache: DashMap<Uuid, (Instant, Vec<SubscriptionView>)>,
    dev_mode: bool,
    max_per_owner: i64,
    default_max_attempts: i32,
    default_timeout_secs: i32,
}

impl WebhookRegistry {
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            list_cache: DashMap::new(),
            dev_mode: config.dev_mode,
            max_per_owner: config.max_subscriptions_per_owner,
            default_max_attempts: config.webhook_max_attempts as i32,
            default_timeout_secs: config.webhook_timeout_secs as i32,
        }
    }

    /// Register a subscription. The signing secret is returned here and
    /// never again.
    pub async fn register(
        &self,
        owner_id: Uuid,
        req: RegisterRequest,
    ) -> Result<RegisteredSubscription, WebhookError> {
        url_guard::validate_target_url(&req.url, self.dev_mode)
            .map_err(WebhookError::Validation)?;
        validate_events(&req.events)?;
        validate_description(req.description.as_deref())?;
        validate_secret(req.signing_secret.as_deref())?;

        let max_attempts = clamp_attempts(req.max_attempts.unwrap_or(self.default_max_attempts));
        let timeout_secs = clamp_timeout(req.timeout_secs.unwrap_or(self.default_timeout_secs));

        let count = queries::count_for_owner(&self.db, owner_id).await?;
        if count >= self.max_per_owner {
            return Err(WebhookError::MaxSubscriptionsReached);
        }

        let secret = req
            .signing_secret
            .unwrap_or_else(signing::generate_signing_secret);

        let id = queries::create_subscription(
            &self.db,
            owner_id,
            &req.url,
            &secret,
            &req.events,
            req.description.as_deref(),
            max_attempts,
            timeout_secs,
        )
        .await?;

        self.list_cache.remove(&owner_id);
        info!(subscription_id = %id, owner_id = %owner_id, "Webhook subscription registered");

        let subscription = queries::get_view(&self.db, id, owner_id)
            .await?
            .ok_or(WebhookError::NotFound)?;

        Ok(RegisteredSubscription {
            subscription,
            signing_secret: secret,
        })
    }

    /// Partial update. `rotate_secret` regenerates the secret and returns
    /// it once. Unknown or unowned subscriptions surface as `NotFound`.
    pub async fn update(
        &self,
        subscription_id: Uuid,
        owner_id: Uuid,
        patch: SubscriptionPatch,
    ) -> Result<UpdatedSubscription, WebhookError> {
        if let Some(ref url) = patch.url {
            url_guard::validate_target_url(url, self.dev_mode).map_err(WebhookError::Validation)?;
        }
        if let Some(ref events) = patch.events {
            validate_events(events)?;
        }
        validate_description(patch.description.as_ref().and_then(|d| d.as_deref()))?;

        let new_secret = patch.rotate_secret.then(signing::generate_signing_secret);
        let description = patch.description.as_ref().map(|d| d.as_deref());

        let updated = queries::update_subscription(
            &self.db,
            subscription_id,
            owner_id,
            patch.url.as_deref(),
            patch.events.as_deref(),
            patch.enabled,
            description,
            patch.max_attempts.map(clamp_attempts),
            patch.timeout_secs.map(clamp_timeout),
            new_secret.as_deref(),
        )
        .await?;

        if !updated {
            return Err(WebhookError::NotFound);
        }

        self.list_cache.remove(&owner_id);

        let subscription = queries::get_view(&self.db, subscription_id, owner_id)
            .await?
            .ok_or(WebhookError::NotFound)?;

        Ok(UpdatedSubscription {
            subscription,
            signing_secret: new_secret,
        })
    }

    /// Hard delete, ownership-checked.
    pub async fn remove(&self, subscription_id: Uuid, owner_id: Uuid) -> Result<(), WebhookError> {
        let deleted = queries::delete_subscription(&self.db, subscription_id, owner_id).await?;
        if !deleted {
            return Err(WebhookError::NotFound);
        }

        self.list_cache.remove(&owner_id);
        info!(subscription_id = %subscription_id, owner_id = %owner_id, "Webhook subscription removed");
        Ok(())
    }

    /// List an owner's subscriptions (secrets redacted), cached briefly.
    pub async fn list_for_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<SubscriptionView>, WebhookError> {
        if let Some(entry) = self.list_cache.get(&owner_id) {
            let (cached_at, views) = entry.value();
            if cached_at.elapsed() < LIST_CACHE_TTL {
                return Ok(views.clone());
            }
        }

        let views = queries::list_for_owner(&self.db, owner_id).await?;
        self.list_cache
            .insert(owner_id, (Instant::now(), views.clone()));
        Ok(views)
    }

    /// Get one subscription view, ownership-checked.
    pub async fn get(
        &self,
        subscription_id: Uuid,
        owner_id: Uuid,
    ) -> Result<SubscriptionView, WebhookError> {
        queries::get_view(&self.db, subscription_id, owner_id)
            .await?
            .ok_or(WebhookError::NotFound)
    }

    /// Cumulative delivery statistics, ownership-checked.
    pub async fn stats(
        &self,
        subscription_id: Uuid,
        owner_id: Uuid,
    ) -> Result<SubscriptionStats, WebhookError> {
        queries::get_stats(&self.db, subscription_id, owner_id)
            .await?
            .ok_or(WebhookError::NotFound)
    }

    /// Enabled subscriptions matching an event type (exact name or
    /// wildcard), optionally scoped to one owner.
    pub async fn resolve_for_event(
        &self,
        event_type: EventType,
        owner_filter: Option<Uuid>,
    ) -> Result<Vec<Subscription>, WebhookError> {
        Ok(queries::resolve_for_event(&self.db, event_type.as_str(), owner_filter).await?)
    }

    /// Like [`Self::resolve_for_event`], plus the count of matching
    /// subscriptions skipped because they are disabled.
    pub(crate) async fn resolve_with_disabled_count(
        &self,
        event_type: EventType,
        owner_filter: Option<Uuid>,
    ) -> Result<(Vec<Subscription>, i64), WebhookError> {
        let enabled =
            queries::resolve_for_event(&self.db, event_type.as_str(), owner_filter).await?;
        let disabled =
            queries::count_disabled_for_event(&self.db, event_type.as_str(), owner_filter).await?;
        Ok((enabled, disabled))
    }

    pub(crate) const fn pool(&self) -> &PgPool {
        &self.db
    }

    pub(crate) const fn dev_mode(&self) -> bool {
        self.dev_mode
    }
}

fn validate_events(patterns: &[String]) -> Result<(), WebhookError> {
    if patterns.is_empty() {
        return Err(WebhookError::Validation(
            "At least one event pattern is required".to_string(),
        ));
    }
    for pattern in patterns {
        if !events::is_valid_pattern(pattern) {
            return Err(WebhookError::Validation(format!(
                "Unknown event pattern: {pattern}"
            )));
        }
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<(), WebhookError> {
    if description.is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN) {
        return Err(WebhookError::Validation(format!(
            "Description must be max {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_secret(secret: Option<&str>) -> Result<(), WebhookError> {
    if secret.is_some_and(|s| s.len() < MIN_SECRET_LEN) {
        return Err(WebhookError::Validation(format!(
            "Signing secret must be at least {MIN_SECRET_LEN} characters"
        )));
    }
    Ok(())
}

fn clamp_attempts(attempts: i32) -> i32 {
    attempts.clamp(*ATTEMPTS_RANGE.start(), *ATTEMPTS_RANGE.end())
}

fn clamp_timeout(timeout_secs: i32) -> i32 {
    timeout_secs.clamp(*TIMEOUT_RANGE.start(), *TIMEOUT_RANGE.end())
}
