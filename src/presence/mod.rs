//! Presence Tracking
//!
//! Soft-state directory of live user connections.

mod directory;
mod types;

pub use directory::PresenceDirectory;
pub use types::{PresenceError, Session, SessionProfile};
