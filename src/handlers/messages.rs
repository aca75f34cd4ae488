use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::cache::{EntityId, Modifiers, QueryKey};
use crate::error::CacheError;
use crate::handlers::{Reconciler, checked_patch};
use crate::inbox::window::{append_unique, read_window, settle_provisional, update_window};
use crate::models::{Message, MessagePatch};
use crate::realtime::NewMessage;

impl Reconciler {
    /// A message was inserted somewhere in the user's inbox.
    pub(crate) fn on_message_inserted(&self, payload: NewMessage) -> Result<(), CacheError> {
        let scope = self.scope().get();
        let NewMessage {
            message,
            conversation,
        } = payload;

        if conversation.id != message.conversation_id {
            warn!(
                "message {} names conversation {} but arrived with {}",
                message.id, message.conversation_id, conversation.id
            );
        }

        let from_me = scope
            .user_id
            .as_deref()
            .is_some_and(|me| message.is_from_user(me));
        let is_open = scope.is_open(&message.conversation_id);

        if let Err(e) = self.bump_total_unread(1) {
            warn!("could not bump total unread count: {e}");
        }

        if let Err(e) = self.project_onto_conversation(&message, !from_me && !is_open) {
            warn!("could not project message {} onto its conversation: {e}", message.id);
        }

        if let Some(open) = scope.conversation.as_ref().filter(|_| is_open) {
            if let Err(e) = self.append_to_window(&open.window(), &message, from_me) {
                warn!("could not append message {} to the open window: {e}", message.id);
            }
        }

        if !from_me {
            self.notify_new_message(&message, &conversation, scope.user_id.as_deref());
        }

        Ok(())
    }

    /// Point the conversation at its newest message and, when asked, count it as unread.
    fn project_onto_conversation(&self, message: &Message, count_unread: bool) -> Result<(), CacheError> {
        let mut modifiers = Modifiers::new()
            .set("lastMessage", serde_json::to_value(message)?)
            .set("updatedAt", serde_json::to_value(Utc::now())?);
        if count_unread {
            modifiers = modifiers.field("unreadCount", |current| {
                json!(current.and_then(Value::as_u64).unwrap_or(0) + 1)
            });
        }

        let entity = EntityId::conversation(&message.conversation_id);
        if !self.store().modify(&entity, modifiers)? {
            debug!("{entity} not cached, sidebar projection skipped");
        }
        Ok(())
    }

    fn append_to_window(&self, key: &QueryKey, message: &Message, from_me: bool) -> Result<(), CacheError> {
        let store = self.store().as_ref();
        let mut claimed = None;
        let changed = update_window(store, key, |window| {
            if window.iter().any(|m| m.id == message.id) {
                debug!("message {} already in window", message.id);
                return false;
            }
            // The server copy of one of our own sends may beat the mutation
            // response; it takes the provisional entry's place.
            if from_me {
                claimed = self.pending().claim(message);
            }
            match &claimed {
                Some(provisional_id) => settle_provisional(window, provisional_id, message.clone()),
                None => append_unique(window, message.clone()),
            }
        })?;

        if changed.is_none() {
            debug!("{} not cached, append skipped", key.cache_key());
        }
        if let Some(provisional_id) = claimed {
            store.evict(&EntityId::message(provisional_id));
        }
        Ok(())
    }

    /// Delivery status (or other fields) of a message changed.
    pub(crate) fn on_message_status_changed(&self, patch: MessagePatch) -> Result<(), CacheError> {
        let scope = self.scope().get();
        let Some(open) = scope.conversation.as_ref() else {
            return Ok(());
        };
        if patch.conversation_id.as_deref().is_some_and(|id| id != open.id) {
            return Ok(());
        }

        let key = open.window();
        let Some(window) = read_window(self.store().as_ref(), &key)? else {
            debug!("{} not cached, status patch skipped", key.cache_key());
            return Ok(());
        };
        let Some(cached) = window.iter().find(|m| m.id == patch.id) else {
            debug!("message {} not in the open window", patch.id);
            return Ok(());
        };

        let mut fields = patch.fields.clone();
        if let Some(status) = patch.status() {
            if !status.supersedes(cached.status) {
                debug!(
                    "ignoring status {:?} for message {}, already {:?}",
                    status, patch.id, cached.status
                );
                fields.remove("status");
            }
        }
        if fields.is_empty() {
            return Ok(());
        }
        if let Err(e) = checked_patch::<Message>(serde_json::to_value(cached)?, &fields) {
            warn!("dropping malformed patch for message {}: {e}", patch.id);
            return Ok(());
        }

        self.store()
            .modify(&EntityId::message(&patch.id), Modifiers::new().merge(fields))?;
        Ok(())
    }
}
