use moka::sync::Cache;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::cache::{
    CacheConfig, EntityId, Modifiers, QueryKey, QueryUpdater, REF_FIELD, Shape, Store, Typename,
};
use crate::error::CacheError;

/// In-process normalized cache.
///
/// Entities live under `Type:id` records; query results hold `{"__ref": ...}`
/// pointers to them, so a patch to one entity shows up in every query that
/// lists it. Records are kept in a bounded `moka` cache: an evicted query or
/// entity reads as a miss and callers fall back to skipping their patch.
///
/// Reads go straight to the records. Every mutation takes one writer lock, so
/// a read-modify-write through [`Store::update`] never interleaves with
/// another write.
#[derive(Clone)]
pub struct NormalizedCache {
    records: Cache<String, Value>,
    writer: Arc<Mutex<()>>,
}

impl NormalizedCache {
    pub fn new(config: &CacheConfig) -> Self {
        let mut builder = Cache::<String, Value>::builder().max_capacity(config.max_entries);
        if let Some(idle) = config.time_to_idle {
            builder = builder.time_to_idle(idle);
        }
        Self {
            records: builder.build(),
            writer: Arc::new(Mutex::new(())),
        }
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The raw normalized record of one entity, references unresolved.
    pub fn entity(&self, id: &EntityId) -> Option<Value> {
        self.records.get(&id.cache_key())
    }

    /// Every record, keyed and sorted by cache key.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.records
            .iter()
            .map(|(key, value)| (key.as_ref().clone(), value))
            .collect()
    }

    /// Store `value` as an entity of `typename`, merging onto any existing
    /// record, and return the reference that replaces it.
    fn normalize_entity(&self, typename: Typename, value: Value) -> Result<Value, CacheError> {
        let mut incoming = match value {
            Value::Null => return Ok(Value::Null),
            Value::Object(map) if map.contains_key(REF_FIELD) => return Ok(Value::Object(map)),
            Value::Object(map) => map,
            other => {
                return Err(CacheError::shape(
                    typename.as_str(),
                    format!("expected an object, got {other}"),
                ));
            }
        };

        let id = incoming
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CacheError::shape(typename.as_str(), "entity has no `_id`"))?;
        let entity = EntityId::new(typename, id);

        for (field, nested) in incoming.iter_mut() {
            if let Some(nested_type) = typename.entity_field(field) {
                let taken = std::mem::take(nested);
                *nested = self.normalize_entity(nested_type, taken)?;
            }
        }

        let key = entity.cache_key();
        let merged = match self.records.get(&key) {
            Some(Value::Object(mut existing)) => {
                existing.extend(incoming);
                existing
            }
            _ => incoming,
        };
        self.records.insert(key, Value::Object(merged));

        Ok(entity.to_ref())
    }

    /// Replace every `{"__ref": ...}` inside an entity record with the entity
    /// it points at. A nested reference that no longer resolves reads as null.
    fn resolve_fields(&self, record: Value) -> Value {
        match record {
            Value::Object(map) => {
                let resolved: Map<String, Value> = map
                    .into_iter()
                    .map(|(field, value)| {
                        let value = match ref_key(&value) {
                            Some(key) => self.resolve_key(&key).unwrap_or(Value::Null),
                            None => value,
                        };
                        (field, value)
                    })
                    .collect();
                Value::Object(resolved)
            }
            other => other,
        }
    }

    fn resolve_key(&self, key: &str) -> Option<Value> {
        self.records.get(key).map(|record| self.resolve_fields(record))
    }

    fn resolve_ref(&self, query: &QueryKey, value: &Value) -> Result<Option<Value>, CacheError> {
        let key = ref_key(value)
            .ok_or_else(|| CacheError::shape(query.cache_key(), "expected an entity reference"))?;
        match self.resolve_key(&key) {
            Some(entity) => Ok(Some(entity)),
            None => {
                debug!("{} references missing entity {}", query.cache_key(), key);
                Ok(None)
            }
        }
    }
    /// Normalize `data` and store it under `query`. Callers hold the writer lock.
    fn store_query(&self, query: &QueryKey, data: Value) -> Result<(), CacheError> {
        let stored = match query.shape() {
            Shape::Scalar => data,
            Shape::Entity(typename) => self.normalize_entity(typename, data)?,
            Shape::List(typename) => {
                let Value::Array(items) = data else {
                    return Err(CacheError::shape(query.cache_key(), "expected a list"));
                };
                let refs = items
                    .into_iter()
                    .map(|item| self.normalize_entity(typename, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(refs)
            }
        };
        self.records.insert(query.cache_key(), stored);
        Ok(())
    }
}

impl Default for NormalizedCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

fn ref_key(value: &Value) -> Option<String> {
    value
        .as_object()
        .filter(|map| map.len() == 1)
        .and_then(|map| map.get(REF_FIELD))
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl Store for NormalizedCache {
    fn read(&self, query: &QueryKey) -> Result<Option<Value>, CacheError> {
        let Some(stored) = self.records.get(&query.cache_key()) else {
            return Ok(None);
        };

        match query.shape() {
            Shape::Scalar => Ok(Some(stored)),
            Shape::Entity(_) => {
                if stored.is_null() {
                    return Ok(Some(Value::Null));
                }
                self.resolve_ref(query, &stored)
            }
            Shape::List(_) => {
                let refs = stored
                    .as_array()
                    .ok_or_else(|| CacheError::shape(query.cache_key(), "expected a list"))?;
                let mut items = Vec::with_capacity(refs.len());
                for item in refs {
                    match self.resolve_ref(query, item)? {
                        Some(entity) => items.push(entity),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::Array(items)))
            }
        }
    }

    fn write(&self, query: &QueryKey, data: Value) -> Result<(), CacheError> {
        let _writer = self.lock_writes();
        self.store_query(query, data)
    }

    fn update(&self, query: &QueryKey, updater: &mut QueryUpdater<'_>) -> Result<bool, CacheError> {
        let _writer = self.lock_writes();
        let current = self.read(query)?;
        match updater(current)? {
            Some(next) => {
                self.store_query(query, next)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn modify(&self, entity: &EntityId, modifiers: Modifiers) -> Result<bool, CacheError> {
        let _writer = self.lock_writes();
        let key = entity.cache_key();
        let Some(record) = self.records.get(&key) else {
            return Ok(false);
        };
        let Value::Object(mut fields) = record else {
            return Err(CacheError::shape(key, "entity record is not an object"));
        };

        for (field, modifier) in modifiers.into_fields() {
            let mut next = modifier(fields.get(&field));
            if let Some(nested_type) = entity.typename.entity_field(&field) {
                next = self.normalize_entity(nested_type, next)?;
            }
            fields.insert(field, next);
        }

        self.records.insert(key, Value::Object(fields));
        Ok(true)
    }

    fn evict(&self, entity: &EntityId) -> bool {
        let _writer = self.lock_writes();
        self.records.remove(&entity.cache_key()).is_some()
    }
}
