use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::api::InboxApi;
use crate::cache::{EntityId, Modifiers, QueryKey, StoreExt};
use crate::error::{CacheError, SyncError};
use crate::handlers::Reconciler;
use crate::models::Conversation;

impl Reconciler {
    /// A conversation's status or assignment changed on the server.
    pub(crate) fn on_conversation_changed(&self, conversation: Conversation) -> Result<(), CacheError> {
        let scope = self.scope().get();

        if scope.is_open(&conversation.id) {
            let key = QueryKey::detail(&conversation.id);
            if let Err(e) = self.store().write_as(&key, &conversation) {
                warn!("could not overwrite {}: {e}", key.cache_key());
            }
        }

        let modifiers = Modifiers::new()
            .set("status", serde_json::to_value(conversation.status)?)
            .set("assignedUserId", serde_json::to_value(&conversation.assigned_user_id)?);
        let entity = EntityId::conversation(&conversation.id);
        if !self.store().modify(&entity, modifiers)? {
            debug!("{entity} not cached, sidebar patch skipped");
        }
        Ok(())
    }

    /// Move the global unread badge by `delta`, never below zero. A badge
    /// that has not been fetched yet counts from zero.
    pub fn bump_total_unread(&self, delta: i64) -> Result<u64, CacheError> {
        let mut next = 0;
        self.store()
            .update_as::<u64, _>(&QueryKey::TotalUnreadCount, |current| {
                next = current.unwrap_or(0).saturating_add_signed(delta);
                Some(next)
            })?;
        Ok(next)
    }

    /// The global unread badge as cached.
    pub fn total_unread(&self) -> Result<u64, CacheError> {
        Ok(self
            .store()
            .read_as(&QueryKey::TotalUnreadCount)?
            .unwrap_or(0))
    }

    /// Tell the server the user has read `conversation_id`, then zero its
    /// unread count and take those messages off the global badge.
    pub async fn mark_conversation_read<A: InboxApi>(
        &self,
        api: &A,
        conversation_id: &str,
    ) -> Result<(), SyncError> {
        api.mark_as_read(conversation_id).await?;

        let cleared = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&cleared);
        let modifiers = Modifiers::new().field("unreadCount", move |current| {
            sink.store(current.and_then(Value::as_u64).unwrap_or(0), Ordering::Relaxed);
            json!(0)
        });

        let entity = EntityId::conversation(conversation_id);
        if !self.store().modify(&entity, modifiers)? {
            debug!("{entity} not cached, nothing to clear");
            return Ok(());
        }

        let cleared = cleared.load(Ordering::Relaxed);
        if cleared > 0 {
            let delta = i64::try_from(cleared).unwrap_or(i64::MAX);
            self.bump_total_unread(-delta)?;
        }
        info!("marked {conversation_id} read, cleared {cleared} unread");
        Ok(())
    }
}
