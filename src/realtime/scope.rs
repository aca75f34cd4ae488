use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;

use crate::cache::QueryKey;

/// The conversation pane currently on screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenConversation {
    pub id: String,
    /// Messenger customer behind the conversation, if any.
    pub customer_id: Option<String>,
    /// Page size the pane's message window was first fetched with.
    pub window_limit: usize,
}

impl OpenConversation {
    pub fn new(id: impl Into<String>, window_limit: usize) -> Self {
        Self {
            id: id.into(),
            customer_id: None,
            window_limit,
        }
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    /// The query backing this pane's message window.
    pub fn window(&self) -> QueryKey {
        QueryKey::window(&self.id, self.window_limit)
    }
}

/// Everything subscriptions and handlers are scoped by.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncScope {
    pub user_id: Option<String>,
    pub conversation: Option<OpenConversation>,
}

impl SyncScope {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            conversation: None,
        }
    }

    pub fn with_conversation(mut self, conversation: Option<OpenConversation>) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn open_conversation_id(&self) -> Option<&str> {
        self.conversation.as_ref().map(|open| open.id.as_str())
    }

    pub fn is_open(&self, conversation_id: &str) -> bool {
        self.open_conversation_id() == Some(conversation_id)
    }
}

/// Latest-value holder for the scope. Handlers read it when they run, so a
/// delivery processed after a conversation switch sees the new conversation.
#[derive(Clone, Debug, Default)]
pub struct ScopeCell(Arc<RwLock<SyncScope>>);

impl ScopeCell {
    pub fn new(scope: SyncScope) -> Self {
        Self(Arc::new(RwLock::new(scope)))
    }

    pub fn get(&self) -> SyncScope {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Swap in `scope`, returning the previous one.
    pub fn replace(&self, scope: SyncScope) -> SyncScope {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, scope)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

/// Who is typing where. Owned entirely by the latest typing event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypingInfo {
    pub conversation_id: String,
    pub text: String,
}

/// Observable, non-persisted UI feedback state.
#[derive(Debug)]
pub struct LiveState {
    connection: watch::Sender<ConnectionStatus>,
    typing: watch::Sender<Option<TypingInfo>>,
}

impl Default for LiveState {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveState {
    pub fn new() -> Self {
        Self {
            connection: watch::Sender::new(ConnectionStatus::Connecting),
            typing: watch::Sender::new(None),
        }
    }

    pub fn connection(&self) -> ConnectionStatus {
        *self.connection.borrow()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.subscribe()
    }

    pub fn set_connection(&self, status: ConnectionStatus) {
        self.connection.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    pub fn typing(&self) -> Option<TypingInfo> {
        self.typing.borrow().clone()
    }

    pub fn subscribe_typing(&self) -> watch::Receiver<Option<TypingInfo>> {
        self.typing.subscribe()
    }

    pub fn set_typing(&self, info: TypingInfo) {
        self.typing.send_replace(Some(info));
    }

    pub fn clear_typing(&self) {
        self.typing.send_if_modified(|current| current.take().is_some());
    }
}
