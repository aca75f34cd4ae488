use serde::{Deserialize, Serialize};

use crate::models::{Conversation, ConversationRef, CustomerPatch, Message, MessagePatch};
use crate::realtime::scope::SyncScope;

// ── Channels ──

/// The five push subscriptions the inbox listens on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    MessageInserted,
    ConversationChanged,
    MessageStatusChanged,
    CustomerConnectionChanged,
    TypingChanged,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::MessageInserted,
        Channel::ConversationChanged,
        Channel::MessageStatusChanged,
        Channel::CustomerConnectionChanged,
        Channel::TypingChanged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::MessageInserted => "message-inserted",
            Channel::ConversationChanged => "conversation-changed",
            Channel::MessageStatusChanged => "message-status-changed",
            Channel::CustomerConnectionChanged => "customer-connection-changed",
            Channel::TypingChanged => "typing-changed",
        }
    }

    /// The id this channel is subscribed with under `scope`, or `None` while
    /// the channel should stay unsubscribed.
    pub fn scoping_key(self, scope: &SyncScope) -> Option<String> {
        match self {
            Channel::MessageInserted | Channel::ConversationChanged => scope.user_id.clone(),
            Channel::MessageStatusChanged | Channel::TypingChanged => {
                scope.open_conversation_id().map(str::to_string)
            }
            Channel::CustomerConnectionChanged => scope
                .conversation
                .as_ref()
                .and_then(|open| open.customer_id.clone()),
        }
    }
}

// ── Payloads ──

/// A message delivered together with its denormalized parent conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub message: Message,
    pub conversation: ConversationRef,
}

/// Someone is (or stopped) typing in a conversation. Empty text means stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdate {
    pub conversation_id: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// A decoded push event, tagged by the channel it arrives on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
pub enum InboxEvent {
    MessageInserted(NewMessage),
    ConversationChanged(Conversation),
    MessageStatusChanged(MessagePatch),
    CustomerConnectionChanged(CustomerPatch),
    TypingChanged(TypingUpdate),
}

impl InboxEvent {
    pub fn channel(&self) -> Channel {
        match self {
            InboxEvent::MessageInserted(_) => Channel::MessageInserted,
            InboxEvent::ConversationChanged(_) => Channel::ConversationChanged,
            InboxEvent::MessageStatusChanged(_) => Channel::MessageStatusChanged,
            InboxEvent::CustomerConnectionChanged(_) => Channel::CustomerConnectionChanged,
            InboxEvent::TypingChanged(_) => Channel::TypingChanged,
        }
    }
}
