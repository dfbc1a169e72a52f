//! Retention Maintenance
//!
//! Hourly background sweep of expired dead letters and delivery log rows.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::{error, info};

use crate::config::Config;
use crate::presence::PresenceDirectory;
use crate::webhooks::queries;

/// Interval between retention sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Run the retention sweeper. Never returns; callers spawn it.
pub async fn run_retention_sweeper(db: PgPool, config: Config, presence: Arc<PresenceDirectory>) {
    info!("Retention sweeper started");

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;

        match queries::cleanup_old_dead_letters(&db, config.dead_letter_retention_days).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Expired dead letters removed"),
            Err(e) => error!("Failed to clean up dead letters: {}", e),
        }

        match queries::cleanup_old_delivery_logs(&db, config.delivery_log_retention_days).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Expired delivery log rows removed"),
            Err(e) => error!("Failed to clean up delivery logs: {}", e),
        }

        match presence.sweep_stale().await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Stale presence index entries removed"),
            Err(e) => error!("Failed to sweep presence index: {}", e),
        }
    }
}
