//! Webhook Subscription & Dispatch System
//!
//! HTTP POST delivery of marketplace events to subscriber endpoints with
//! HMAC signing, retry logic, statistics, and dead-letter handling.

pub mod dispatcher;
pub mod queries;
pub mod registry;
pub mod signing;
pub mod types;
pub mod url_guard;

pub use dispatcher::WebhookDispatcher;
pub use registry::WebhookRegistry;
pub use signing::verify_signature;
