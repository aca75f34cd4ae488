use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Prefix carried by the temporary identity of a provisional message.
pub const PROVISIONAL_PREFIX: &str = "temp-";

/// Delivery lifecycle of a message: sending → sent → delivered → seen, or failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    #[default]
    Sent,
    Delivered,
    Seen,
    Failed,
}

impl MessageStatus {
    fn rank(self) -> u8 {
        match self {
            MessageStatus::Sending => 0,
            MessageStatus::Failed => 1,
            MessageStatus::Sent => 2,
            MessageStatus::Delivered => 3,
            MessageStatus::Seen => 4,
        }
    }

    /// Whether moving from `current` to `self` goes forward in the lifecycle.
    pub fn supersedes(self, current: MessageStatus) -> bool {
        self.rank() >= current.rank()
    }
}

/// A file attached to a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A conversation message as the server (and the cache) sees it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentioned_user_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

/// Who wrote a message. A well-formed message has exactly one author reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Author<'a> {
    User(&'a str),
    Customer(&'a str),
}

impl Message {
    pub fn author(&self) -> Option<Author<'_>> {
        match (self.user_id.as_deref(), self.customer_id.as_deref()) {
            (Some(user), None) => Some(Author::User(user)),
            (None, Some(customer)) => Some(Author::Customer(customer)),
            _ => None,
        }
    }

    /// True when `user_id` wrote this message.
    pub fn is_from_user(&self, user_id: &str) -> bool {
        matches!(self.author(), Some(Author::User(author)) if author == user_id)
    }

    pub fn is_provisional(&self) -> bool {
        self.id.starts_with(PROVISIONAL_PREFIX)
    }

    /// Build the provisional entity rendered while a send is in flight.
    pub fn provisional(draft: &MessageDraft, user_id: &str, correlation_id: Uuid) -> Self {
        Self {
            id: format!("{PROVISIONAL_PREFIX}{}", correlation_id.simple()),
            conversation_id: draft.conversation_id.clone(),
            user_id: Some(user_id.to_string()),
            customer_id: None,
            content: draft.content.clone(),
            attachments: draft.attachments.clone(),
            mentioned_user_ids: draft.mentioned_user_ids.clone(),
            reply_to_id: draft.reply_to_id.clone(),
            internal: draft.internal,
            status: MessageStatus::Sending,
            created_at: Utc::now(),
        }
    }
}

// ── DTOs ──

/// What the local user typed, before it becomes a message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub conversation_id: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub mentioned_user_ids: Vec<String>,
    #[serde(default)]
    pub reply_to_id: Option<String>,
    #[serde(default)]
    pub internal: bool,
}

/// Partial message carried by a status-changed event. Everything other than
/// the identity is merged onto the cached entity as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePatch {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MessagePatch {
    pub fn status(&self) -> Option<MessageStatus> {
        self.fields
            .get("status")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
