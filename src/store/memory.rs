// src/store/memory.rs

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};

use super::{ChangeEvent, DocumentStore, StoreError, Versioned};

const CHANGE_CAPACITY: usize = 1024;

/// Process-local store used for development and tests.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, (u64, Value)>>>,
    tx: broadcast::Sender<ChangeEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            collections: RwLock::new(HashMap::new()),
            tx,
        }
    }

    fn notify(&self, collection: &str, id: &str, revision: u64, body: Option<Value>) {
        // No receivers is fine.
        let _ = self.tx.send(ChangeEvent {
            collection: collection.to_string(),
            id: id.to_string(),
            revision,
            body,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Versioned>, StoreError> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|(revision, body)| Versioned {
                id: id.to_string(),
                revision: *revision,
                body: body.clone(),
            }))
    }

    async fn put(&self, collection: &str, id: &str, body: Value) -> Result<u64, StoreError> {
        let revision = {
            let mut guard = self.collections.write().await;
            let docs = guard.entry(collection.to_string()).or_default();
            let revision = docs.get(id).map(|(rev, _)| rev + 1).unwrap_or(1);
            docs.insert(id.to_string(), (revision, body.clone()));
            revision
        };
        self.notify(collection, id, revision, Some(body));
        Ok(revision)
    }

    async fn create(&self, collection: &str, id: &str, body: Value) -> Result<bool, StoreError> {
        {
            let mut guard = self.collections.write().await;
            let docs = guard.entry(collection.to_string()).or_default();
            if docs.contains_key(id) {
                return Ok(false);
            }
            docs.insert(id.to_string(), (1, body.clone()));
        }
        self.notify(collection, id, 1, Some(body));
        Ok(true)
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        expected_revision: u64,
        body: Value,
    ) -> Result<bool, StoreError> {
        let revision = {
            let mut guard = self.collections.write().await;
            let Some(slot) = guard.get_mut(collection).and_then(|docs| docs.get_mut(id)) else {
                return Ok(false);
            };
            if slot.0 != expected_revision {
                return Ok(false);
            }
            *slot = (expected_revision + 1, body.clone());
            slot.0
        };
        self.notify(collection, id, revision, Some(body));
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let removed = {
            let mut guard = self.collections.write().await;
            guard.get_mut(collection).and_then(|docs| docs.remove(id))
        };
        match removed {
            Some((revision, _)) => {
                self.notify(collection, id, revision + 1, None);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Versioned>, StoreError> {
        let guard = self.collections.read().await;
        let Some(docs) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, (_, body))| body.get(field) == Some(value))
            .map(|(id, (revision, body))| Versioned {
                id: id.clone(),
                revision: *revision,
                body: body.clone(),
            })
            .collect())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Versioned>, StoreError> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, (revision, body))| Versioned {
                        id: id.clone(),
                        revision: *revision,
                        body: body.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}
