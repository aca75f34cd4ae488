pub mod conversations;
pub mod messages;
pub mod notifications;
pub mod presence;

pub use notifications::{Notification, NotificationTitles, Notifier, TracingNotifier, strip_markup};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, warn};

use crate::cache::Store;
use crate::error::{CacheError, TransportError};
use crate::inbox::PendingSends;
use crate::realtime::{Channel, ConnectionStatus, InboxEvent, LiveState, ScopeCell};

/// Applies push events to the cache.
///
/// Every handler reads the scope at the moment it runs and catches its own
/// failures; a bad event is logged and dropped, never propagated.
pub struct Reconciler {
    store: Arc<dyn Store>,
    scope: ScopeCell,
    live: LiveState,
    pending: PendingSends,
    notifier: Arc<dyn Notifier>,
    titles: NotificationTitles,
    require_interaction: bool,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, scope: ScopeCell, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            scope,
            live: LiveState::new(),
            pending: PendingSends::new(),
            notifier,
            titles: NotificationTitles::default(),
            require_interaction: false,
        }
    }

    pub fn with_titles(mut self, titles: NotificationTitles) -> Self {
        self.titles = titles;
        self
    }

    pub fn with_require_interaction(mut self, require_interaction: bool) -> Self {
        self.require_interaction = require_interaction;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn scope(&self) -> &ScopeCell {
        &self.scope
    }

    pub fn live(&self) -> &LiveState {
        &self.live
    }

    pub fn pending(&self) -> &PendingSends {
        &self.pending
    }

    /// Take one delivery off `channel`.
    pub fn apply(&self, channel: Channel, item: Result<InboxEvent, TransportError>) {
        match item {
            Ok(event) if event.channel() != channel => {
                warn!(
                    "{} event delivered on {}, dropping it",
                    event.channel().as_str(),
                    channel.as_str()
                );
            }
            Ok(event) => self.handle(event),
            Err(e) => {
                warn!("{} subscription failed: {e}", channel.as_str());
                self.live.set_connection(ConnectionStatus::Disconnected);
                if channel == Channel::TypingChanged {
                    self.live.clear_typing();
                }
            }
        }
    }

    /// Route a decoded event to its handler.
    pub fn handle(&self, event: InboxEvent) {
        self.live.set_connection(ConnectionStatus::Connected);

        let channel = event.channel();
        let result: Result<(), CacheError> = match event {
            // ── Messages ──
            InboxEvent::MessageInserted(payload) => self.on_message_inserted(payload),
            InboxEvent::MessageStatusChanged(patch) => self.on_message_status_changed(patch),

            // ── Conversations ──
            InboxEvent::ConversationChanged(conversation) => {
                self.on_conversation_changed(conversation)
            }

            // ── Presence ──
            InboxEvent::CustomerConnectionChanged(patch) => {
                self.on_customer_connection_changed(patch)
            }
            InboxEvent::TypingChanged(update) => {
                self.on_typing_changed(update);
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("{} handler failed: {e}", channel.as_str());
        }
    }

    /// The open conversation changed: state tied to the old one goes away.
    pub fn on_conversation_switch(&self) {
        self.live.clear_typing();
    }
}

/// Lay `fields` over `current` and decode the result, so a patch that would
/// leave an entity unreadable is caught before it reaches the cache.
pub(crate) fn checked_patch<T: DeserializeOwned>(
    current: Value,
    fields: &Map<String, Value>,
) -> Result<T, serde_json::Error> {
    let mut merged = match current {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    merged.extend(fields.iter().map(|(name, value)| (name.clone(), value.clone())));
    serde_json::from_value(Value::Object(merged))
}
