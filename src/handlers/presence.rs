use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::cache::{EntityId, Modifiers, QueryKey};
use crate::error::CacheError;
use crate::handlers::{Reconciler, checked_patch};
use crate::models::{Customer, CustomerPatch};
use crate::realtime::{TypingInfo, TypingUpdate};

impl Reconciler {
    /// The messenger customer behind the open conversation came online or went away.
    pub(crate) fn on_customer_connection_changed(&self, patch: CustomerPatch) -> Result<(), CacheError> {
        let scope = self.scope().get();
        let Some(open) = scope.conversation.as_ref() else {
            return Ok(());
        };

        let Some(detail) = self.store().read(&QueryKey::detail(&open.id))? else {
            debug!("conversation {} detail not cached, customer patch skipped", open.id);
            return Ok(());
        };
        if cached_customer_id(&detail) != Some(patch.id.as_str()) {
            return Ok(());
        }

        let cached = detail
            .get("customer")
            .filter(|customer| customer.is_object())
            .cloned()
            .unwrap_or_else(|| json!({ "_id": patch.id }));
        if let Err(e) = checked_patch::<Customer>(cached, &patch.fields) {
            warn!("dropping malformed patch for customer {}: {e}", patch.id);
            return Ok(());
        }

        let entity = EntityId::customer(&patch.id);
        if !self.store().modify(&entity, Modifiers::new().merge(patch.fields))? {
            debug!("{entity} not cached, customer patch skipped");
        }
        Ok(())
    }

    /// Typing state belongs to whichever event came last.
    pub(crate) fn on_typing_changed(&self, update: TypingUpdate) {
        let scope = self.scope().get();
        let text = update.text.filter(|text| !text.trim().is_empty());

        match text {
            Some(text) if scope.is_open(&update.conversation_id) => {
                self.live().set_typing(TypingInfo {
                    conversation_id: update.conversation_id,
                    text,
                });
            }
            _ => self.live().clear_typing(),
        }
    }
}

fn cached_customer_id(detail: &Value) -> Option<&str> {
    detail
        .get("customer")
        .and_then(|customer| customer.get("_id"))
        .or_else(|| detail.get("customerId"))
        .and_then(Value::as_str)
}
