// src/store/postgres.rs

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{
    FromRow, PgPool,
    postgres::{PgListener, PgPoolOptions},
    types::Json,
};
use tokio::sync::broadcast;

use super::{ChangeEvent, DocumentStore, StoreError, Versioned};

const NOTIFY_CHANNEL: &str = "document_changes";
const CHANGE_CAPACITY: usize = 1024;
const CONNECT_RETRIES: u32 = 5;

#[derive(FromRow)]
struct DocumentRow {
    id: String,
    revision: i64,
    body: Json<Value>,
}

impl From<DocumentRow> for Versioned {
    fn from(row: DocumentRow) -> Self {
        Versioned {
            id: row.id,
            revision: row.revision as u64,
            body: row.body.0,
        }
    }
}

/// Payload of a `pg_notify` call. The body is re-read by the listener,
/// notification payloads are size limited.
#[derive(Deserialize)]
struct ChangeNotice {
    collection: String,
    id: String,
    revision: u64,
    deleted: bool,
}

/// Document store on a single Postgres `documents` table.
///
/// Every write queues a `pg_notify` in the same statement; a background
/// `PgListener` turns the notifications of every connected process into
/// local change events.
pub struct PgDocumentStore {
    pool: PgPool,
    tx: broadcast::Sender<ChangeEvent>,
}

impl PgDocumentStore {
    /// Connects with retry, applies migrations and starts the change listener.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let mut retry_count = 0;
        let pool = loop {
            match PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(3))
                .connect(database_url)
                .await
            {
                Ok(pool) => break pool,
                Err(e) => {
                    retry_count += 1;
                    if retry_count > CONNECT_RETRIES {
                        return Err(e.into());
                    }
                    tracing::warn!(
                        "Database not ready, retrying in 2s... (Attempt {})",
                        retry_count
                    );
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        };
        tracing::info!("Database connected...");

        tracing::info!("Running migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Migrations applied successfully.");

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> Result<Self, StoreError> {
        let (tx, _) = broadcast::channel(CHANGE_CAPACITY);

        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;
        tokio::spawn(forward_notifications(listener, pool.clone(), tx.clone()));

        Ok(Self { pool, tx })
    }
}

/// Wraps a write returning `(collection, id, revision)` so its change notice
/// is queued in the same statement. Postgres delivers the notice only when
/// the write commits.
fn notifying(write: &str, channel_param: &str, deleted: bool) -> String {
    format!(
        r#"
        WITH written AS ({write}),
        notified AS (
            SELECT pg_notify(
                {channel_param},
                json_build_object(
                    'collection', collection,
                    'id', id,
                    'revision', revision,
                    'deleted', {deleted}
                )::text
            )
            FROM written
        )
        SELECT written.revision FROM written, notified
        "#
    )
}

async fn forward_notifications(
    mut listener: PgListener,
    pool: PgPool,
    tx: broadcast::Sender<ChangeEvent>,
) {
    loop {
        let notification = match listener.recv().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("change listener error: {:?}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let notice: ChangeNotice = match serde_json::from_str(notification.payload()) {
            Ok(notice) => notice,
            Err(e) => {
                tracing::warn!("ignoring malformed change notice: {}", e);
                continue;
            }
        };

        let body = if notice.deleted {
            None
        } else {
            match fetch(&pool, &notice.collection, &notice.id).await {
                Ok(doc) => doc.map(|d| d.body),
                Err(e) => {
                    tracing::warn!("failed to load changed document: {}", e);
                    continue;
                }
            }
        };

        let _ = tx.send(ChangeEvent {
            collection: notice.collection,
            id: notice.id,
            revision: notice.revision,
            body,
        });
    }
}

async fn fetch(pool: &PgPool, collection: &str, id: &str) -> Result<Option<Versioned>, StoreError> {
    let row = sqlx::query_as::<_, DocumentRow>(
        "SELECT id, revision, body FROM documents WHERE collection = $1 AND id = $2",
    )
    .bind(collection)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Versioned::from))
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Versioned>, StoreError> {
        fetch(&self.pool, collection, id).await
    }

    async fn put(&self, collection: &str, id: &str, body: Value) -> Result<u64, StoreError> {
        let revision: i64 = sqlx::query_scalar(&notifying(
            r#"
            INSERT INTO documents (collection, id, revision, body)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (collection, id) DO UPDATE SET
                revision = documents.revision + 1,
                body = EXCLUDED.body,
                updated_at = NOW()
            RETURNING collection, id, revision
            "#,
            "$4",
            false,
        ))
        .bind(collection)
        .bind(id)
        .bind(Json(&body))
        .bind(NOTIFY_CHANNEL)
        .fetch_one(&self.pool)
        .await?;

        Ok(revision as u64)
    }

    async fn create(&self, collection: &str, id: &str, body: Value) -> Result<bool, StoreError> {
        let revision: Option<i64> = sqlx::query_scalar(&notifying(
            r#"
            INSERT INTO documents (collection, id, revision, body)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (collection, id) DO NOTHING
            RETURNING collection, id, revision
            "#,
            "$4",
            false,
        ))
        .bind(collection)
        .bind(id)
        .bind(Json(&body))
        .bind(NOTIFY_CHANNEL)
        .fetch_optional(&self.pool)
        .await?;

        Ok(revision.is_some())
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        expected_revision: u64,
        body: Value,
    ) -> Result<bool, StoreError> {
        let revision: Option<i64> = sqlx::query_scalar(&notifying(
            r#"
            UPDATE documents
            SET body = $4, revision = revision + 1, updated_at = NOW()
            WHERE collection = $1 AND id = $2 AND revision = $3
            RETURNING collection, id, revision
            "#,
            "$5",
            false,
        ))
        .bind(collection)
        .bind(id)
        .bind(expected_revision as i64)
        .bind(Json(&body))
        .bind(NOTIFY_CHANNEL)
        .fetch_optional(&self.pool)
        .await?;

        Ok(revision.is_some())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        // A deletion is announced one revision past the last stored one.
        let revision: Option<i64> = sqlx::query_scalar(&notifying(
            r#"
            DELETE FROM documents
            WHERE collection = $1 AND id = $2
            RETURNING collection, id, revision + 1 AS revision
            "#,
            "$3",
            true,
        ))
        .bind(collection)
        .bind(id)
        .bind(NOTIFY_CHANNEL)
        .fetch_optional(&self.pool)
        .await?;

        Ok(revision.is_some())
    }

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Versioned>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, revision, body
            FROM documents
            WHERE collection = $1 AND body -> $2 = $3
            ORDER BY id
            "#,
        )
        .bind(collection)
        .bind(field)
        .bind(Json(value))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Versioned::from).collect())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Versioned>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, revision, body FROM documents WHERE collection = $1 ORDER BY id",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Versioned::from).collect())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Runs only against a live database; skipped when `DATABASE_URL` is unset.
    async fn store() -> Option<PgDocumentStore> {
        let url = std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty())?;
        Some(PgDocumentStore::connect(&url).await.unwrap())
    }

    async fn next_change(rx: &mut broadcast::Receiver<ChangeEvent>, collection: &str) -> ChangeEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("no change event within 5s")
                .unwrap();
            if event.collection == collection {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_every_committed_write_is_announced() {
        let Some(store) = store().await else {
            return;
        };
        let collection = format!("store_test_{}", uuid::Uuid::new_v4().simple());
        let mut rx = store.changes();

        assert_eq!(store.put(&collection, "a", json!({"n": 1})).await.unwrap(), 1);
        let event = next_change(&mut rx, &collection).await;
        assert_eq!((event.id.as_str(), event.revision), ("a", 1));
        assert_eq!(event.body, Some(json!({"n": 1})));

        assert!(store.create(&collection, "b", json!({"n": 2})).await.unwrap());
        assert_eq!(next_change(&mut rx, &collection).await.id, "b");
        // First writer wins; the loser writes nothing and announces nothing.
        assert!(!store.create(&collection, "b", json!({"n": 3})).await.unwrap());

        assert!(!store.replace(&collection, "a", 7, json!({"n": 9})).await.unwrap());
        assert!(store.replace(&collection, "a", 1, json!({"n": 4})).await.unwrap());
        let event = next_change(&mut rx, &collection).await;
        assert_eq!((event.id.as_str(), event.revision), ("a", 2));

        assert!(store.delete(&collection, "b").await.unwrap());
        let event = next_change(&mut rx, &collection).await;
        assert_eq!((event.id.as_str(), event.revision), ("b", 2));
        assert_eq!(event.body, None);
        assert!(!store.delete(&collection, "b").await.unwrap());

        let doc = store.get(&collection, "a").await.unwrap().unwrap();
        assert_eq!((doc.revision, doc.body), (2, json!({"n": 4})));
    }
}
