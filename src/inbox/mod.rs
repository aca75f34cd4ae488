//! The local user's side of a conversation: sending and paging history.

pub mod send;
pub mod window;

pub use send::{MessageSender, PendingSend, PendingSends};
pub use window::{LoadOutcome, WindowLoader};
