pub mod conversations;
pub mod customers;
pub mod messages;

pub use conversations::{Conversation, ConversationRef, ConversationStatus};
pub use customers::{Customer, CustomerPatch};
pub use messages::{Attachment, Author, Message, MessageDraft, MessagePatch, MessageStatus};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of message history, counted back from the newest message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub skip: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn new(skip: usize, limit: usize) -> Self {
        Self {
            skip,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }
}
