//! Conversation state management
//!
//! The session controller owns all state transitions; the store keeps the
//! history across restarts.

mod session;
mod store;

pub use session::{ConversationView, Listener, SessionController};
pub use store::{open_store, DEFAULT_KEY};
