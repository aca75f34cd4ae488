pub mod events;
pub mod router;
pub mod scope;
pub mod source;

pub use events::{Channel, InboxEvent, NewMessage, TypingUpdate};
pub use router::EventRouter;
pub use scope::{ConnectionStatus, LiveState, OpenConversation, ScopeCell, SyncScope, TypingInfo};
pub use source::{ChannelSource, EventSource, EventStream};
