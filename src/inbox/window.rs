use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::api::InboxApi;
use crate::cache::{QueryKey, Store, StoreExt};
use crate::error::{CacheError, SyncError};
use crate::models::{Message, PageRequest};
use crate::realtime::OpenConversation;

// ── Window merges ──

/// Put an older page in front of `window`, dropping any message whose id the
/// window (or an earlier item of the page) already has. Page order is kept.
pub fn merge_older(window: Vec<Message>, older: Vec<Message>) -> Vec<Message> {
    let mut seen: HashSet<String> = window.iter().map(|m| m.id.clone()).collect();
    let mut merged: Vec<Message> = older
        .into_iter()
        .filter(|m| seen.insert(m.id.clone()))
        .collect();
    merged.extend(window);
    merged
}

/// Append `message` unless a message with the same id is already there.
pub fn append_unique(window: &mut Vec<Message>, message: Message) -> bool {
    if window.iter().any(|m| m.id == message.id) {
        return false;
    }
    window.push(message);
    true
}

pub fn remove_by_id(window: &mut Vec<Message>, id: &str) -> bool {
    let before = window.len();
    window.retain(|m| m.id != id);
    window.len() != before
}

/// Replace the provisional entry `provisional_id` with `confirmed`. If the
/// confirmed message is already in the window the provisional entry is just
/// dropped, so exactly one copy remains either way.
pub fn settle_provisional(window: &mut Vec<Message>, provisional_id: &str, confirmed: Message) -> bool {
    let confirmed_present = window.iter().any(|m| m.id == confirmed.id);
    match window.iter().position(|m| m.id == provisional_id) {
        Some(index) if confirmed_present => {
            window.remove(index);
            true
        }
        Some(index) => {
            window[index] = confirmed;
            true
        }
        None if confirmed_present => false,
        None => {
            window.push(confirmed);
            true
        }
    }
}

pub fn read_window(store: &dyn Store, key: &QueryKey) -> Result<Option<Vec<Message>>, CacheError> {
    store.read_as(key)
}

/// Edit a cached window in place with no other write landing in between.
/// Returns `None` when the window is not cached; `f` then never runs.
pub fn update_window<R>(
    store: &dyn Store,
    key: &QueryKey,
    f: impl FnOnce(&mut Vec<Message>) -> R,
) -> Result<Option<R>, CacheError> {
    let mut result = None;
    store.update_as::<Vec<Message>, _>(key, |current| {
        let mut window = current?;
        result = Some(f(&mut window));
        Some(window)
    })?;
    Ok(result)
}

// ── Loader ──

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// `added` older messages were prepended.
    Loaded { added: usize },
    /// A load for this conversation was already in flight; nothing was requested.
    AlreadyLoading,
    /// The window already holds the whole history.
    Exhausted,
    /// The window query is not cached, so there is nothing to grow.
    WindowMissing,
}

/// Removes the in-flight marker when a load finishes, however it finishes.
struct LoadingGuard<'a> {
    loading: &'a Mutex<HashSet<String>>,
    conversation_id: String,
}

impl<'a> LoadingGuard<'a> {
    fn acquire(loading: &'a Mutex<HashSet<String>>, conversation_id: &str) -> Option<Self> {
        let inserted = loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conversation_id.to_string());
        inserted.then(|| Self {
            loading,
            conversation_id: conversation_id.to_string(),
        })
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.conversation_id);
    }
}

/// Grows message windows backwards ("load more"), one request per
/// conversation at a time.
pub struct WindowLoader<A: InboxApi> {
    api: Arc<A>,
    store: Arc<dyn Store>,
    loading: Mutex<HashSet<String>>,
    /// Conversations whose history ran out, with the oldest message id the
    /// window had then. The mark only holds while that id is still first.
    exhausted: Mutex<HashMap<String, Option<String>>>,
}

impl<A: InboxApi> WindowLoader<A> {
    pub fn new(api: Arc<A>, store: Arc<dyn Store>) -> Self {
        Self {
            api,
            store,
            loading: Mutex::new(HashSet::new()),
            exhausted: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_loading(&self, conversation_id: &str) -> bool {
        self.loading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(conversation_id)
    }

    fn is_exhausted(&self, conversation_id: &str, window: &[Message]) -> bool {
        let oldest = window.first().map(|m| m.id.as_str());
        self.exhausted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .is_some_and(|marked| marked.as_deref() == oldest)
    }

    fn mark_exhausted(&self, conversation_id: &str, oldest: Option<&str>) {
        self.exhausted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conversation_id.to_string(), oldest.map(str::to_string));
    }

    fn clear_exhausted(&self, conversation_id: &str) {
        self.exhausted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(conversation_id);
    }

    fn total_count(&self, conversation_id: &str) -> Result<Option<usize>, CacheError> {
        let key = QueryKey::ConversationMessagesTotalCount {
            conversation_id: conversation_id.to_string(),
        };
        self.store.read_as(&key)
    }

    /// Fetch the page of messages just older than the window and prepend it.
    pub async fn load_more(&self, open: &OpenConversation) -> Result<LoadOutcome, SyncError> {
        let Some(_guard) = LoadingGuard::acquire(&self.loading, &open.id) else {
            debug!("load more for {} ignored, already loading", open.id);
            return Ok(LoadOutcome::AlreadyLoading);
        };

        let key = open.window();
        let Some(current) = read_window(self.store.as_ref(), &key)? else {
            debug!("{} not cached, nothing to load more into", key.cache_key());
            return Ok(LoadOutcome::WindowMissing);
        };

        // A known total count beats an exhaustion mark left by an earlier window.
        match self.total_count(&open.id)? {
            Some(total) if current.len() >= total => {
                self.mark_exhausted(&open.id, current.first().map(|m| m.id.as_str()));
                return Ok(LoadOutcome::Exhausted);
            }
            Some(_) => self.clear_exhausted(&open.id),
            None if self.is_exhausted(&open.id, &current) => return Ok(LoadOutcome::Exhausted),
            None => {}
        }

        let page = PageRequest::new(current.len(), open.window_limit);
        let older = self.api.fetch_messages(&open.id, page).await?;
        let short = older.len() < page.limit;
        if older.is_empty() {
            self.mark_exhausted(&open.id, current.first().map(|m| m.id.as_str()));
            return Ok(LoadOutcome::Exhausted);
        }

        // New arrivals may have been appended while the request was in flight.
        let merged = update_window(self.store.as_ref(), &key, |window| {
            let before = window.len();
            *window = merge_older(std::mem::take(window), older);
            (window.len() - before, window.first().map(|m| m.id.clone()))
        })?;
        let Some((added, oldest)) = merged else {
            debug!("{} evicted during load more", key.cache_key());
            return Ok(LoadOutcome::WindowMissing);
        };
        if short {
            self.mark_exhausted(&open.id, oldest.as_deref());
        }

        info!("loaded {added} older messages into {}", open.id);
        Ok(LoadOutcome::Loaded { added })
    }
}
