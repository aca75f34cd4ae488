//! Shared fixtures for the integration tests: message/conversation builders,
//! a scripted `InboxApi`, and a notifier that records what it was asked to show.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use inbox_sync::api::InboxApi;
use inbox_sync::cache::{NormalizedCache, QueryKey, Store, StoreExt};
use inbox_sync::error::ApiError;
use inbox_sync::handlers::{Notification, Notifier, Reconciler};
use inbox_sync::models::{
    Conversation, ConversationRef, ConversationStatus, Message, MessageDraft, MessageStatus,
    PageRequest,
};
use inbox_sync::realtime::{NewMessage, OpenConversation, ScopeCell, SyncScope};

pub const ME: &str = "user-me";
pub const TEAMMATE: &str = "user-teammate";
pub const PAGE: usize = 20;

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

pub fn customer_message(id: &str, conversation_id: &str, content: &str) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        user_id: None,
        customer_id: Some(format!("cust-{conversation_id}")),
        content: content.to_string(),
        attachments: Vec::new(),
        mentioned_user_ids: Vec::new(),
        reply_to_id: None,
        internal: false,
        status: MessageStatus::Sent,
        created_at: at(0),
    }
}

pub fn user_message(id: &str, conversation_id: &str, user_id: &str, content: &str) -> Message {
    Message {
        user_id: Some(user_id.to_string()),
        customer_id: None,
        ..customer_message(id, conversation_id, content)
    }
}

pub fn conversation(id: &str) -> Conversation {
    Conversation {
        id: id.to_string(),
        status: ConversationStatus::Open,
        assigned_user_id: None,
        customer_id: Some(format!("cust-{id}")),
        customer: None,
        integration_kind: Some("messenger".to_string()),
        last_message: None,
        unread_count: 0,
        updated_at: Some(at(0)),
    }
}

pub fn new_message(message: Message, kind: &str) -> NewMessage {
    NewMessage {
        conversation: ConversationRef {
            id: message.conversation_id.clone(),
            integration_kind: Some(kind.to_string()),
            customer_id: message.customer_id.clone(),
        },
        message,
    }
}

pub fn draft(conversation_id: &str, content: &str) -> MessageDraft {
    MessageDraft {
        conversation_id: conversation_id.to_string(),
        content: content.to_string(),
        ..MessageDraft::default()
    }
}

pub fn open(conversation_id: &str) -> OpenConversation {
    OpenConversation::new(conversation_id, PAGE)
}

pub fn scope_with(conversation_id: Option<&str>) -> SyncScope {
    SyncScope::for_user(ME).with_conversation(conversation_id.map(open))
}

// ── Notifier ──

#[derive(Default)]
pub struct RecordingNotifier {
    pub shown: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.shown.lock().unwrap().push(notification);
    }
}

// ── Harness ──

pub struct Harness {
    pub store: Arc<NormalizedCache>,
    pub reconciler: Arc<Reconciler>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(scope: SyncScope) -> Self {
        let store = Arc::new(NormalizedCache::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            ScopeCell::new(scope),
            notifier.clone(),
        ));
        Self {
            store,
            reconciler,
            notifier,
        }
    }

    pub fn seed_sidebar(&self, conversations: &[Conversation]) {
        let key = QueryKey::ConversationList {
            user_id: ME.to_string(),
        };
        self.store.write_as(&key, &conversations).unwrap();
    }

    pub fn seed_detail(&self, conversation: &Conversation) {
        self.store
            .write_as(&QueryKey::detail(&conversation.id), conversation)
            .unwrap();
    }

    pub fn seed_window(&self, conversation_id: &str, messages: &[Message]) {
        self.store
            .write_as(&open(conversation_id).window(), &messages)
            .unwrap();
    }

    pub fn window(&self, conversation_id: &str) -> Option<Vec<Message>> {
        self.store.read_as(&open(conversation_id).window()).unwrap()
    }

    pub fn window_ids(&self, conversation_id: &str) -> Vec<String> {
        self.window(conversation_id)
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.id)
            .collect()
    }

    pub fn sidebar(&self) -> Vec<Conversation> {
        let key = QueryKey::ConversationList {
            user_id: ME.to_string(),
        };
        self.store.read_as(&key).unwrap().unwrap_or_default()
    }

    pub fn sidebar_entry(&self, conversation_id: &str) -> Conversation {
        self.sidebar()
            .into_iter()
            .find(|c| c.id == conversation_id)
            .expect("conversation should be in the sidebar")
    }

    pub fn total_unread(&self) -> u64 {
        self.reconciler.total_unread().unwrap()
    }

    pub fn raw(&self, key: &QueryKey) -> Option<serde_json::Value> {
        self.store.read(key).unwrap()
    }
}

// ── API ──

/// A scripted server. Sends echo the draft back under `srv-<n>` ids; fetches
/// return whatever `history_page` holds. Either call can be held open on a
/// gate until the test releases it.
#[derive(Default)]
pub struct FakeApi {
    pub sent: Mutex<Vec<MessageDraft>>,
    pub fetches: Mutex<Vec<(String, PageRequest)>>,
    pub marked_read: Mutex<Vec<String>>,
    pub history_page: Mutex<Vec<Message>>,
    pub fail_send: AtomicBool,
    pub send_gate: Option<Arc<Notify>>,
    pub fetch_gate: Option<Arc<Notify>>,
    next_id: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(self, page: Vec<Message>) -> Self {
        *self.history_page.lock().unwrap() = page;
        self
    }

    pub fn with_send_gate(mut self, gate: Arc<Notify>) -> Self {
        self.send_gate = Some(gate);
        self
    }

    pub fn with_fetch_gate(mut self, gate: Arc<Notify>) -> Self {
        self.fetch_gate = Some(gate);
        self
    }

    pub fn failing(self) -> Self {
        self.fail_send.store(true, Ordering::SeqCst);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

impl InboxApi for FakeApi {
    async fn send_message(&self, draft: &MessageDraft) -> Result<Message, ApiError> {
        self.sent.lock().unwrap().push(draft.clone());
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.send_gate {
            gate.notified().await;
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(ApiError::Graphql("conversation is closed".to_string()));
        }
        Ok(user_message(
            &format!("srv-{n}"),
            &draft.conversation_id,
            ME,
            &draft.content,
        ))
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        page: PageRequest,
    ) -> Result<Vec<Message>, ApiError> {
        self.fetches
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), page));
        if let Some(gate) = &self.fetch_gate {
            gate.notified().await;
        }
        Ok(self.history_page.lock().unwrap().clone())
    }

    async fn mark_as_read(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.marked_read
            .lock()
            .unwrap()
            .push(conversation_id.to_string());
        Ok(())
    }
}
