pub mod memory;

pub use memory::NormalizedCache;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

use crate::config::{parse_env, parse_env_opt};
use crate::error::CacheError;

/// Field under which a normalized record points at an entity.
pub const REF_FIELD: &str = "__ref";

/// Entity types the cache normalizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Typename {
    Conversation,
    Message,
    Customer,
}

impl Typename {
    pub fn as_str(self) -> &'static str {
        match self {
            Typename::Conversation => "Conversation",
            Typename::Message => "Message",
            Typename::Customer => "Customer",
        }
    }

    /// The entity type stored under `field` of this type, if that field holds one.
    pub fn entity_field(self, field: &str) -> Option<Typename> {
        match (self, field) {
            (Typename::Conversation, "lastMessage") => Some(Typename::Message),
            (Typename::Conversation, "customer") => Some(Typename::Customer),
            _ => None,
        }
    }
}

/// Identity of a cached entity: type plus `_id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityId {
    pub typename: Typename,
    pub id: String,
}

impl EntityId {
    pub fn new(typename: Typename, id: impl Into<String>) -> Self {
        Self {
            typename,
            id: id.into(),
        }
    }

    pub fn conversation(id: impl Into<String>) -> Self {
        Self::new(Typename::Conversation, id)
    }

    pub fn message(id: impl Into<String>) -> Self {
        Self::new(Typename::Message, id)
    }

    pub fn customer(id: impl Into<String>) -> Self {
        Self::new(Typename::Customer, id)
    }

    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.typename.as_str(), self.id)
    }

    /// The `{"__ref": ...}` value that stands in for this entity inside other records.
    pub fn to_ref(&self) -> Value {
        let mut map = Map::new();
        map.insert(REF_FIELD.to_string(), Value::String(self.cache_key()));
        Value::Object(map)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.typename.as_str(), self.id)
    }
}

/// The root queries the inbox keeps results for.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// `conversationDetail(_id)`: the open conversation pane.
    ConversationDetail { id: String },
    /// `conversationMessages(conversationId, limit, skip)`: a message window.
    ConversationMessages {
        conversation_id: String,
        limit: usize,
        skip: usize,
    },
    /// `conversations(userId)`: the sidebar list.
    ConversationList { user_id: String },
    /// `conversationsTotalUnreadCount`: the global badge.
    TotalUnreadCount,
    /// `conversationMessagesTotalCount(conversationId)`.
    ConversationMessagesTotalCount { conversation_id: String },
}

/// What a query result holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    Entity(Typename),
    List(Typename),
    Scalar,
}

impl QueryKey {
    /// The window a conversation pane renders: newest `limit` messages, grown
    /// in place by "load more".
    pub fn window(conversation_id: impl Into<String>, limit: usize) -> Self {
        QueryKey::ConversationMessages {
            conversation_id: conversation_id.into(),
            limit,
            skip: 0,
        }
    }

    pub fn detail(id: impl Into<String>) -> Self {
        QueryKey::ConversationDetail { id: id.into() }
    }

    pub fn shape(&self) -> Shape {
        match self {
            QueryKey::ConversationDetail { .. } => Shape::Entity(Typename::Conversation),
            QueryKey::ConversationMessages { .. } => Shape::List(Typename::Message),
            QueryKey::ConversationList { .. } => Shape::List(Typename::Conversation),
            QueryKey::TotalUnreadCount | QueryKey::ConversationMessagesTotalCount { .. } => {
                Shape::Scalar
            }
        }
    }

    pub fn cache_key(&self) -> String {
        match self {
            QueryKey::ConversationDetail { id } => {
                format!("conversationDetail({{\"_id\":\"{id}\"}})")
            }
            QueryKey::ConversationMessages {
                conversation_id,
                limit,
                skip,
            } => format!(
                "conversationMessages({{\"conversationId\":\"{conversation_id}\",\"limit\":{limit},\"skip\":{skip}}})"
            ),
            QueryKey::ConversationList { user_id } => {
                format!("conversations({{\"userId\":\"{user_id}\"}})")
            }
            QueryKey::TotalUnreadCount => "conversationsTotalUnreadCount".to_string(),
            QueryKey::ConversationMessagesTotalCount { conversation_id } => {
                format!("conversationMessagesTotalCount({{\"conversationId\":\"{conversation_id}\"}})")
            }
        }
    }
}

pub type FieldModifier = Box<dyn FnOnce(Option<&Value>) -> Value + Send>;

/// Read-modify-write step for [`Store::update`]: receives the resolved query
/// result and returns the replacement, or `None` to leave it untouched.
pub type QueryUpdater<'a> = dyn FnMut(Option<Value>) -> Result<Option<Value>, CacheError> + 'a;

/// Field-level patches applied to one entity by [`Store::modify`].
///
/// A modifier receives the stored value of its field (entity-valued fields
/// hold a `{"__ref": ...}` object) and returns the replacement. Returning a
/// full entity object for an entity-valued field stores that entity too.
#[derive(Default)]
pub struct Modifiers {
    fields: Vec<(String, FieldModifier)>,
}

impl Modifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<F>(mut self, name: impl Into<String>, modifier: F) -> Self
    where
        F: FnOnce(Option<&Value>) -> Value + Send + 'static,
    {
        self.fields.push((name.into(), Box::new(modifier)));
        self
    }

    pub fn set(self, name: impl Into<String>, value: Value) -> Self {
        self.field(name, move |_| value)
    }

    /// Overwrite every field in `fields`.
    pub fn merge(mut self, fields: Map<String, Value>) -> Self {
        for (name, value) in fields {
            self = self.set(name, value);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<(String, FieldModifier)> {
        self.fields
    }
}

impl fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.fields.iter().map(|(name, _)| name))
            .finish()
    }
}

/// The normalized client cache the reconciliation core reads and patches.
pub trait Store: Send + Sync {
    /// Read a query result with entity references resolved. `Ok(None)` when
    /// the query, or an entity it lists, is not cached.
    fn read(&self, query: &QueryKey) -> Result<Option<Value>, CacheError>;

    /// Store a query result, normalizing every entity it contains.
    fn write(&self, query: &QueryKey, data: Value) -> Result<(), CacheError>;

    /// Read a query result, hand it to `updater` and store what comes back,
    /// with no other write in between. Returns whether anything was written.
    fn update(&self, query: &QueryKey, updater: &mut QueryUpdater<'_>) -> Result<bool, CacheError>;

    /// Patch fields of one entity in place. `Ok(false)` when it is not cached.
    fn modify(&self, entity: &EntityId, modifiers: Modifiers) -> Result<bool, CacheError>;

    /// Drop one entity. Returns whether it was cached.
    fn evict(&self, entity: &EntityId) -> bool;
}

/// Typed helpers over [`Store`], the same way values go through serde on the way in and out.
pub trait StoreExt: Store {
    fn read_as<T: DeserializeOwned>(&self, query: &QueryKey) -> Result<Option<T>, CacheError> {
        match self.read(query)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn write_as<T: Serialize>(&self, query: &QueryKey, value: &T) -> Result<(), CacheError> {
        self.write(query, serde_json::to_value(value)?)
    }

    /// Typed [`Store::update`]. `f` runs at most once.
    fn update_as<T, F>(&self, query: &QueryKey, f: F) -> Result<bool, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(Option<T>) -> Option<T>,
    {
        let mut f = Some(f);
        self.update(query, &mut |current| {
            let Some(f) = f.take() else {
                return Ok(None);
            };
            let current = current.map(serde_json::from_value).transpose()?;
            match f(current) {
                Some(next) => Ok(Some(serde_json::to_value(next)?)),
                None => Ok(None),
            }
        })
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

/// Cache configuration
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub time_to_idle: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            time_to_idle: None,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            max_entries: parse_env("INBOX_CACHE_MAX_ENTRIES", 10_000),
            time_to_idle: parse_env_opt::<u64>("INBOX_CACHE_IDLE_SECS").map(Duration::from_secs),
        }
    }
}
