//! Agora Relay - Main Entry Point
//!
//! Delivery-core worker daemon: consumes the message queue, sweeps
//! retention, and exposes the service objects the domain layer injects.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use agora_relay::delivery::{LivePush, MessagePipeline, OfflineStore};
use agora_relay::presence::PresenceDirectory;
use agora_relay::{config, db, delivery, health, maintenance};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora_relay=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Agora Relay delivery core"
    );

    // Initialize stores
    let db_pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&db_pool).await?;
    let redis = db::create_redis_client(&config.redis_url).await?;

    let report = health::check(&db_pool, &redis).await;
    if !report.healthy() {
        anyhow::bail!("Store health check failed: {report:?}");
    }
    info!(
        dead_letter_backlog = report.dead_letter_backlog,
        "Stores reachable"
    );

    // Wire the delivery pipeline
    let presence = Arc::new(PresenceDirectory::new(
        redis.clone(),
        config.presence_ttl_secs,
    ));
    let pipeline = Arc::new(MessagePipeline::new(
        redis.clone(),
        presence.clone(),
        LivePush::new(redis.clone()),
        OfflineStore::new(redis.clone(), config.offline_ttl_secs),
        config.receipt_ttl_secs,
    ));

    // Background workers
    let worker = tokio::spawn(delivery::run_delivery_worker(redis.clone(), pipeline));
    let sweeper = tokio::spawn(maintenance::run_retention_sweeper(
        db_pool.clone(),
        config.clone(),
        presence,
    ));

    info!("Delivery core running");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Received shutdown signal, stopping workers");

    worker.abort();
    sweeper.abort();

    info!("Shutdown complete");
    Ok(())
}
