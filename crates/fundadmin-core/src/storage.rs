use crate::error::FundError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Collection names shared by every domain service.
pub mod collections {
    pub const USERS: &str = "users";
    pub const STRUCTURES: &str = "structures";
    pub const INVESTMENTS: &str = "investments";
    pub const CONTRACTS: &str = "contracts";
}

/// Equality-conjunction filter over top-level document fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: BTreeMap<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }

    /// JSON object form consumed by the JSONB containment query.
    pub fn as_json(&self) -> Value {
        Value::Object(
            self.conditions
                .iter()
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect(),
        )
    }
}

/// Storage collaborator consumed by every domain service.
///
/// A not-found condition on a single-record fetch is an absence value, not
/// an error, so callers can branch without error-handling ceremony. Every
/// call is an independent suspension point; no ordering is guaranteed
/// relative to other concurrent callers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, FundError>;

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, FundError>;

    async fn insert(&self, collection: &str, id: &str, record: Value) -> Result<(), FundError>;

    /// Shallow-merges `patch` into the stored document in one round-trip
    /// and returns the updated document. A reader never observes a
    /// partially applied patch.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, FundError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), FundError>;
}

/// Document persistence backend configuration.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Keep all collections in process memory only.
    Memory,
    /// Persist all documents in PostgreSQL.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }

    pub async fn bootstrap(self) -> Result<Arc<dyn DocumentStore>, FundError> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryDocumentStore::new())),
            Self::Postgres {
                database_url,
                max_connections,
            } => {
                let store = PostgresDocumentStore::connect(&database_url, max_connections).await?;
                store.ensure_schema().await?;
                Ok(Arc::new(store))
            }
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// In-memory backend for development and tests.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn merge_patch(document: &mut Value, patch: &Value) {
    if let (Value::Object(target), Value::Object(changes)) = (document, patch) {
        for (field, value) in changes {
            target.insert(field.clone(), value.clone());
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, FundError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, FundError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|documents| {
                documents
                    .values()
                    .filter(|document| filter.matches(document))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, id: &str, record: Value) -> Result<(), FundError> {
        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();
        if documents.contains_key(id) {
            return Err(FundError::Storage(format!(
                "duplicate document '{id}' in collection '{collection}'"
            )));
        }
        documents.insert(id.to_string(), record);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, FundError> {
        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| FundError::not_found("document", id))?;
        merge_patch(document, &patch);
        Ok(document.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), FundError> {
        let mut collections = self.collections.write().await;
        let removed = collections
            .get_mut(collection)
            .and_then(|documents| documents.remove(id));
        match removed {
            Some(_) => Ok(()),
            None => Err(FundError::not_found("document", id)),
        }
    }
}

/// PostgreSQL backend over a single JSONB documents table.
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, FundError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| FundError::Storage(format!("postgres connect failed: {e}")))?;

        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<(), FundError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fund_documents (
                collection TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                payload JSONB NOT NULL,
                PRIMARY KEY (collection, doc_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FundError::Storage(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_fund_documents_payload ON fund_documents USING GIN (payload)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| FundError::Storage(format!("postgres index create failed: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, FundError> {
        let row = sqlx::query(
            "SELECT payload FROM fund_documents WHERE collection = $1 AND doc_id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FundError::Storage(format!("postgres fetch failed: {e}")))?;

        row.map(|row| {
            row.try_get("payload")
                .map_err(|e| FundError::Storage(format!("postgres decode payload failed: {e}")))
        })
        .transpose()
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, FundError> {
        let rows = if filter.is_empty() {
            sqlx::query(
                "SELECT payload FROM fund_documents WHERE collection = $1 ORDER BY doc_id ASC",
            )
            .bind(collection)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                SELECT payload FROM fund_documents
                WHERE collection = $1 AND payload @> $2
                ORDER BY doc_id ASC
                "#,
            )
            .bind(collection)
            .bind(filter.as_json())
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| FundError::Storage(format!("postgres query failed: {e}")))?;

        rows.into_iter()
            .map(|row| {
                row.try_get("payload")
                    .map_err(|e| FundError::Storage(format!("postgres decode payload failed: {e}")))
            })
            .collect()
    }

    async fn insert(&self, collection: &str, id: &str, record: Value) -> Result<(), FundError> {
        let result = sqlx::query(
            r#"
            INSERT INTO fund_documents (collection, doc_id, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, doc_id) DO NOTHING
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(record)
        .execute(&self.pool)
        .await
        .map_err(|e| FundError::Storage(format!("postgres insert failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(FundError::Storage(format!(
                "duplicate document '{id}' in collection '{collection}'"
            )));
        }

        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, FundError> {
        let row = sqlx::query(
            r#"
            UPDATE fund_documents
            SET payload = payload || $3
            WHERE collection = $1 AND doc_id = $2
            RETURNING payload
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(patch)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FundError::Storage(format!("postgres update failed: {e}")))?;

        match row {
            Some(row) => row
                .try_get("payload")
                .map_err(|e| FundError::Storage(format!("postgres decode payload failed: {e}"))),
            None => Err(FundError::not_found("document", id)),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), FundError> {
        let result =
            sqlx::query("DELETE FROM fund_documents WHERE collection = $1 AND doc_id = $2")
                .bind(collection)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| FundError::Storage(format!("postgres delete failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(FundError::not_found("document", id));
        }

        Ok(())
    }
}
