use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::InboxApi;
use crate::cache::{EntityId, QueryKey, Store};
use crate::error::{CacheError, SyncError};
use crate::handlers::Reconciler;
use crate::inbox::window::{append_unique, remove_by_id, settle_provisional, update_window};
use crate::models::{Message, MessageDraft};

/// A send that has been rendered provisionally and not yet settled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSend {
    pub correlation_id: Uuid,
    pub provisional_id: String,
    pub conversation_id: String,
    pub content: String,
    /// Set once the authoritative message arrived over the event stream first.
    pub claimed_by: Option<String>,
}

/// Provisional messages awaiting their server copy, shared between the send
/// path and the new-message handler.
#[derive(Clone, Debug, Default)]
pub struct PendingSends(Arc<Mutex<Vec<PendingSend>>>);

impl PendingSends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pending: PendingSend) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pending);
    }

    /// Match an authoritative message from the local user to the oldest
    /// unclaimed provisional send with the same conversation and content.
    /// Returns that send's provisional id.
    pub fn claim(&self, message: &Message) -> Option<String> {
        let mut pending = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = pending.iter_mut().find(|p| {
            p.claimed_by.is_none()
                && p.conversation_id == message.conversation_id
                && p.content == message.content
        })?;
        entry.claimed_by = Some(message.id.clone());
        Some(entry.provisional_id.clone())
    }

    /// Whether the server copy of this send has already been seen.
    pub fn is_claimed(&self, correlation_id: Uuid) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|p| p.correlation_id == correlation_id && p.claimed_by.is_some())
    }

    /// Forget a send once it has been confirmed or rolled back.
    pub fn finish(&self, correlation_id: Uuid) -> Option<PendingSend> {
        let mut pending = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let index = pending.iter().position(|p| p.correlation_id == correlation_id)?;
        Some(pending.remove(index))
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sends messages optimistically: the provisional copy shows up in the open
/// window at once and is swapped for the server's copy when the mutation
/// resolves, or removed when it fails.
pub struct MessageSender<A: InboxApi> {
    api: Arc<A>,
    reconciler: Arc<Reconciler>,
}

impl<A: InboxApi> MessageSender<A> {
    pub fn new(api: Arc<A>, reconciler: Arc<Reconciler>) -> Self {
        Self { api, reconciler }
    }

    fn store(&self) -> &dyn Store {
        self.reconciler.store().as_ref()
    }

    pub async fn send(&self, draft: MessageDraft) -> Result<Message, SyncError> {
        let scope = self.reconciler.scope().get();
        let user_id = scope.user_id.clone().ok_or(SyncError::NotSignedIn)?;

        let correlation_id = Uuid::new_v4();
        let provisional = Message::provisional(&draft, &user_id, correlation_id);
        let provisional_id = provisional.id.clone();

        // Only a window on screen needs the provisional copy.
        let window = scope
            .conversation
            .as_ref()
            .filter(|open| open.id == draft.conversation_id)
            .map(|open| open.window());

        self.reconciler.pending().register(PendingSend {
            correlation_id,
            provisional_id: provisional_id.clone(),
            conversation_id: draft.conversation_id.clone(),
            content: draft.content.clone(),
            claimed_by: None,
        });

        if let Some(key) = &window {
            if let Err(e) = self.insert_provisional(key, correlation_id, provisional) {
                warn!("could not render provisional message {provisional_id}: {e}");
            }
        }

        match self.api.send_message(&draft).await {
            Ok(confirmed) => {
                info!("message {} confirmed for {}", confirmed.id, confirmed.conversation_id);
                if let Err(e) = self.confirm(window.as_ref(), &provisional_id, confirmed.clone()) {
                    error!("could not settle provisional message {provisional_id}: {e}");
                }
                self.reconciler.pending().finish(correlation_id);
                Ok(confirmed)
            }
            Err(e) => {
                warn!("sending to {} failed: {e}", draft.conversation_id);
                if let Err(cache_err) = self.roll_back(window.as_ref(), &provisional_id) {
                    error!("could not roll back provisional message {provisional_id}: {cache_err}");
                }
                self.reconciler.pending().finish(correlation_id);
                Err(e.into())
            }
        }
    }

    fn insert_provisional(
        &self,
        key: &QueryKey,
        correlation_id: Uuid,
        provisional: Message,
    ) -> Result<(), CacheError> {
        let pending = self.reconciler.pending();
        let inserted = update_window(self.store(), key, |window| {
            // The server copy already landed, so there is nothing to stand in for.
            !pending.is_claimed(correlation_id) && append_unique(window, provisional)
        })?;
        if inserted.is_none() {
            debug!("{} not cached, provisional message not rendered", key.cache_key());
        }
        Ok(())
    }

    fn confirm(
        &self,
        key: Option<&QueryKey>,
        provisional_id: &str,
        confirmed: Message,
    ) -> Result<(), CacheError> {
        if let Some(key) = key {
            update_window(self.store(), key, |window| {
                settle_provisional(window, provisional_id, confirmed)
            })?;
        }
        self.store().evict(&EntityId::message(provisional_id));
        Ok(())
    }

    fn roll_back(&self, key: Option<&QueryKey>, provisional_id: &str) -> Result<(), CacheError> {
        if let Some(key) = key {
            update_window(self.store(), key, |window| remove_by_id(window, provisional_id))?;
        }
        self.store().evict(&EntityId::message(provisional_id));
        Ok(())
    }
}
