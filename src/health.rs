//! Health Reporting
//!
//! Store reachability and dead-letter backlog for the administrative
//! surface.

use fred::prelude::*;
use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;

use crate::webhooks::queries;

/// Snapshot of delivery-core health.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub postgres_ok: bool,
    pub redis_ok: bool,
    /// Deliveries awaiting manual retry; `None` when Postgres is down.
    pub dead_letter_backlog: Option<i64>,
}

impl HealthReport {
    pub const fn healthy(&self) -> bool {
        self.postgres_ok && self.redis_ok
    }
}

/// Probe both stores and report the dead-letter backlog.
pub async fn check(db: &PgPool, redis: &Client) -> HealthReport {
    let postgres_ok = match queries::ping(db).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Postgres health check failed: {}", e);
            false
        }
    };

    let redis_ok = match redis.ping::<String>(None).await {
        Ok(_) => true,
        Err(e) => {
            warn!("Redis health check failed: {}", e);
            false
        }
    };

    let dead_letter_backlog = if postgres_ok {
        match queries::count_dead_letters(db).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Failed to count dead letters: {}", e);
                None
            }
        }
    } else {
        None
    };

    HealthReport {
        postgres_ok,
        redis_ok,
        dead_letter_backlog,
    }
}
