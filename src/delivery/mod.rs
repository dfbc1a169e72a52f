//! Message Delivery Pipeline
//!
//! Durable queueing, presence-aware routing, and offline replay for chat
//! messages.

mod live;
mod offline;
mod pipeline;
mod queue;
pub mod types;

pub use live::LivePush;
pub use offline::OfflineStore;
pub use pipeline::MessagePipeline;
pub use queue::{run_delivery_worker, MessageQueue};
