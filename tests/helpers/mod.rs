//! Reusable helpers for store-backed integration tests.
//!
//! ## Shared Resources
//!
//! Use [`shared_pool()`] and [`shared_redis()`] to avoid creating new
//! connections per test. Both return `None` when the store is not
//! reachable, letting the test skip with a note on stderr instead of
//! failing on machines without the local services running.
//!
//! ## Webhook Receiver
//!
//! Use [`WebhookReceiver`] as a scripted target endpoint for delivery
//! tests: it answers each request with the next status in its script.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::OnceCell;

use agora_relay::config::Config;
use agora_relay::db;

/// Shared database pool across all tests in the same binary.
static SHARED_POOL: OnceCell<Option<PgPool>> = OnceCell::const_new();

/// Shared Redis client across all tests in the same binary.
static SHARED_REDIS: OnceCell<Option<fred::clients::Client>> = OnceCell::const_new();

pub fn test_config() -> Config {
    Config::default_for_test()
}

/// Get or create a shared, migrated database pool. `None` when Postgres
/// is unreachable.
pub async fn shared_pool() -> Option<&'static PgPool> {
    SHARED_POOL
        .get_or_init(|| async {
            let config = test_config();
            let pool = match db::create_pool(&config.database_url).await {
                Ok(pool) => pool,
                Err(e) => {
                    eprintln!("skipping: Postgres unavailable: {e}");
                    return None;
                }
            };
            if let Err(e) = db::run_migrations(&pool).await {
                eprintln!("skipping: migrations failed: {e}");
                return None;
            }
            Some(pool)
        })
        .await
        .as_ref()
}

/// Get or create a shared Redis client. `None` when Redis is unreachable.
pub async fn shared_redis() -> Option<&'static fred::clients::Client> {
    SHARED_REDIS
        .get_or_init(|| async { connect_redis().await })
        .await
        .as_ref()
}

/// Open a fresh Redis connection (e.g. for a pub/sub subscriber, which
/// cannot share a connection with command traffic).
pub async fn connect_redis() -> Option<fred::clients::Client> {
    let config = test_config();
    match tokio::time::timeout(
        Duration::from_secs(5),
        db::create_redis_client(&config.redis_url),
    )
    .await
    {
        Ok(Ok(client)) => Some(client),
        Ok(Err(e)) => {
            eprintln!("skipping: Redis unavailable: {e}");
            None
        }
        Err(_) => {
            eprintln!("skipping: Redis connect timed out");
            None
        }
    }
}

/// Minimal scripted HTTP endpoint standing in for a subscriber's server.
///
/// Answers the n-th request with the n-th status in the script, repeating
/// the last status once the script is exhausted.
pub struct WebhookReceiver {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl WebhookReceiver {
    pub async fn start(statuses: Vec<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind webhook receiver");
        let addr = listener.local_addr().expect("webhook receiver addr");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let status = statuses
                    .get(n)
                    .or_else(|| statuses.last())
                    .copied()
                    .unwrap_or(200);

                tokio::spawn(async move {
                    let mut buf = [0u8; 8192];
                    let _ = stream.read(&mut buf).await;
                    let reason = if (200..300).contains(&status) { "OK" } else { "ERR" };
                    let response = format!(
                        "HTTP/1.1 {status} {reason}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            url: format!("http://{addr}/hook"),
            hits,
        }
    }

    /// Number of requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}
