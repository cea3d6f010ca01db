//! Cache of entities received in `linked` side-tables.

use ello_core::environment::{LinkedObjectResolver, LinkedObjects};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type Entities = HashMap<String, HashMap<String, Value>>;

/// Keeps linked entities by type and `id` so mapped payloads can look up the
/// objects they reference.
///
/// Objects without an `id` are skipped. A later object with the same type and
/// `id` replaces the earlier one.
#[derive(Debug, Clone, Default)]
pub struct LinkedObjectStore {
    entities: Arc<RwLock<Entities>>,
}

impl LinkedObjectStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached entity of `kind` with `id`.
    #[must_use]
    pub fn get(&self, kind: &str, id: &str) -> Option<Value> {
        let entities = self.entities.read().ok()?;
        entities.get(kind)?.get(id).cloned()
    }

    /// Total number of cached entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities
            .read()
            .map(|entities| entities.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    /// Whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge a side-table into the cache.
    pub fn insert(&self, linked: LinkedObjects) {
        let Ok(mut entities) = self.entities.write() else {
            tracing::error!("Linked object store lock poisoned");
            return;
        };

        for (kind, objects) in linked {
            let bucket = entities.entry(kind).or_default();
            for object in objects {
                if let Some(id) = object.get("id").and_then(entity_id) {
                    bucket.insert(id, object);
                }
            }
        }
    }
}

fn entity_id(id: &Value) -> Option<String> {
    match id {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

impl LinkedObjectResolver for LinkedObjectStore {
    fn resolve(&self, linked: LinkedObjects) -> BoxFuture<'static, ()> {
        let store = self.clone();
        async move { store.insert(linked) }.boxed()
    }
}
