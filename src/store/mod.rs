// src/store/mod.rs

//! Replicated document store.
//!
//! All engine state (tests, attempt sessions, auto-test configurations and
//! the question bank) lives in JSON documents grouped by collection. Every
//! document carries a `revision` that increases on each write so callers can
//! do compare-and-set updates on top of an otherwise last-write-wins store.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

pub const QUESTIONS: &str = "questions";
pub const TESTS: &str = "tests";
pub const ATTEMPTS: &str = "attempts";
pub const AUTO_TEST_CONFIGS: &str = "auto_test_configs";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("document {collection}/{id} is malformed: {source}")]
    Malformed {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// A stored document and its revision.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub id: String,
    pub revision: u64,
    pub body: Value,
}

/// A change pushed to subscribers after every successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub collection: String,
    pub id: String,
    pub revision: u64,
    /// `None` when the document was deleted.
    pub body: Option<Value>,
}

/// Equality filter on one top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn new(field: &str, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn matches(&self, body: &Value) -> bool {
        body.get(&self.field) == Some(&self.value)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Versioned>, StoreError>;

    /// Unconditional write. Returns the new revision.
    async fn put(&self, collection: &str, id: &str, body: Value) -> Result<u64, StoreError>;

    /// Writes only if no document with this id exists. The first writer wins.
    async fn create(&self, collection: &str, id: &str, body: Value) -> Result<bool, StoreError>;

    /// Writes only if the stored revision still equals `expected_revision`.
    async fn replace(
        &self,
        collection: &str,
        id: &str,
        expected_revision: u64,
        body: Value,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// Documents whose top-level `field` equals `value`, ordered by id.
    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Versioned>, StoreError>;

    /// Every document of a collection, ordered by id.
    async fn list(&self, collection: &str) -> Result<Vec<Versioned>, StoreError>;

    /// Raw change feed of the store. Use `subscribe` for a filtered view.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// A filtered view on the change feed of one collection.
pub struct Subscription {
    collection: String,
    filter: Option<FieldFilter>,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Waits for the next matching change. Returns `None` once the store is gone.
    ///
    /// A subscriber that falls behind skips the dropped events; readers
    /// recompute from the store anyway, so only the wake-up matters.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if event.collection != self.collection {
                        continue;
                    }
                    let matches = match (&self.filter, &event.body) {
                        (None, _) => true,
                        (Some(filter), Some(body)) => filter.matches(body),
                        (Some(_), None) => true,
                    };
                    if matches {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, collection = %self.collection, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Typed helpers over the raw JSON interface.
impl dyn DocumentStore {
    pub fn subscribe(&self, collection: &str, filter: Option<FieldFilter>) -> Subscription {
        Subscription {
            collection: collection.to_string(),
            filter,
            rx: self.changes(),
        }
    }

    pub async fn load<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<(T, u64)>, StoreError> {
        match self.get(collection, id).await? {
            Some(doc) => Ok(Some((decode(collection, doc.id, doc.body)?, doc.revision))),
            None => Ok(None),
        }
    }

    pub async fn save<T: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        doc: &T,
    ) -> Result<u64, StoreError> {
        let body = serde_json::to_value(doc)?;
        self.put(collection, id, body).await
    }

    pub async fn create_doc<T: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        doc: &T,
    ) -> Result<bool, StoreError> {
        let body = serde_json::to_value(doc)?;
        self.create(collection, id, body).await
    }

    pub async fn replace_doc<T: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        expected_revision: u64,
        doc: &T,
    ) -> Result<bool, StoreError> {
        let body = serde_json::to_value(doc)?;
        self.replace(collection, id, expected_revision, body).await
    }

    pub async fn find_by<T: DeserializeOwned>(
        &self,
        collection: &str,
        field: &str,
        value: impl Into<Value> + Send,
    ) -> Result<Vec<T>, StoreError> {
        let value = value.into();
        self.query_by_field(collection, field, &value)
            .await?
            .into_iter()
            .map(|doc| decode(collection, doc.id, doc.body))
            .collect()
    }

    pub async fn list_all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, StoreError> {
        self.list(collection)
            .await?
            .into_iter()
            .map(|doc| decode(collection, doc.id, doc.body))
            .collect()
    }
}

fn decode<T: DeserializeOwned>(collection: &str, id: String, body: Value) -> Result<T, StoreError> {
    serde_json::from_value(body).map_err(|source| StoreError::Malformed {
        collection: collection.to_string(),
        id,
        source,
    })
}
