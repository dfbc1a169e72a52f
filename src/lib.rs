//! Agora Relay
//!
//! Reliable event delivery core for a marketplace backend: outbound
//! webhook dispatch with signed, retried, durable delivery, and a
//! presence-aware chat message pipeline with offline-queue replay.
//! Both guarantee at-least-once delivery; idempotency is the consumer's
//! responsibility.

pub mod config;
pub mod db;
pub mod delivery;
pub mod events;
pub mod health;
pub mod maintenance;
pub mod presence;
pub mod webhooks;
