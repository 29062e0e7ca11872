//! PostgreSQL adapter for the `MintCore` document store.
//!
//! Documents are persisted as JSONB rows in a single `mintcore_documents`
//! table with a version column. Optimistic concurrency control is a plain
//! conditional update, `UPDATE ... WHERE version = $expected`, so the
//! relational backend satisfies the same port contract as a
//! document-oriented store satisfies with an etag.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use mintcore::errors::{StoreError, StoreResult};
use mintcore::store::{DocumentStore, ExpectedVersion, Versioned};
use mintcore::types::{DocumentKey, DocumentVersion};
use nutype::nutype;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{query, Pool, Postgres, Row};
use thiserror::Error;
use tracing::{error, instrument};

/// Errors raised while constructing the store itself.
#[derive(Debug, Error)]
pub enum PostgresStoreError {
    /// The connection pool could not be created.
    #[error("failed to create postgres connection pool")]
    ConnectionFailed(#[source] sqlx::Error),
}

/// Maximum number of database connections in the pool.
///
/// Must be at least 1, enforced by using `NonZeroU32` as the underlying
/// type.
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRef, Into))]
pub struct MaxConnections(std::num::NonZeroU32);

/// Configuration for the `PostgresDocumentStore` connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10).
    pub max_connections: MaxConnections,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds).
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 10 minutes).
    pub idle_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        const DEFAULT_MAX_CONNECTIONS: std::num::NonZeroU32 = match std::num::NonZeroU32::new(10) {
            Some(v) => v,
            None => unreachable!(),
        };

        Self {
            max_connections: MaxConnections::new(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Document store backed by a PostgreSQL table.
///
/// Generic over the document type; one store instance serves one
/// document family (inventory lots or mint batches), mirroring how the
/// coordinators are typed.
#[derive(Debug)]
pub struct PostgresDocumentStore<D> {
    pool: Pool<Postgres>,
    _document: PhantomData<fn() -> D>,
}

impl<D> Clone for PostgresDocumentStore<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _document: PhantomData,
        }
    }
}

impl<D> PostgresDocumentStore<D> {
    /// Creates a store with default configuration.
    pub async fn new<S: Into<String>>(connection_string: S) -> Result<Self, PostgresStoreError> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    /// Creates a store with custom configuration.
    pub async fn with_config<S: Into<String>>(
        connection_string: S,
        config: PostgresConfig,
    ) -> Result<Self, PostgresStoreError> {
        let connection_string = connection_string.into();
        let max_connections: std::num::NonZeroU32 = config.max_connections.into();
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.get())
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&connection_string)
            .await
            .map_err(PostgresStoreError::ConnectionFailed)?;
        Ok(Self::from_pool(pool))
    }

    /// Creates a store from an existing connection pool.
    ///
    /// Use this when several stores (lots, batches) share one pool.
    pub const fn from_pool(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            _document: PhantomData,
        }
    }

    /// Verifies connectivity. Panics on failure.
    pub async fn ping(&self) {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .expect("postgres ping failed");
    }

    /// Applies the embedded migrations. Panics on failure.
    pub async fn migrate(&self) {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .expect("postgres migration failed");
    }

    async fn current_version(&self, key: &DocumentKey) -> StoreResult<Option<DocumentVersion>> {
        let row = query("SELECT version FROM mintcore_documents WHERE document_key = $1")
            .bind(key.as_ref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| map_sqlx_error("version", err))?;

        row.map(|row| {
            let version: i64 = row
                .try_get("version")
                .map_err(|err| map_sqlx_error("version", err))?;
            decode_version(key, version)
        })
        .transpose()
    }
}

#[async_trait]
impl<D> DocumentStore for PostgresDocumentStore<D>
where
    D: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Document = D;

    #[instrument(name = "postgres.get_document", skip(self), fields(document = %key))]
    async fn get(&self, key: &DocumentKey) -> StoreResult<Versioned<Self::Document>> {
        let row = query("SELECT document, version FROM mintcore_documents WHERE document_key = $1")
            .bind(key.as_ref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| map_sqlx_error("get", err))?
            .ok_or_else(|| StoreError::DocumentNotFound(key.clone()))?;

        let payload: Value = row
            .try_get("document")
            .map_err(|err| map_sqlx_error("get", err))?;
        let version: i64 = row
            .try_get("version")
            .map_err(|err| map_sqlx_error("get", err))?;

        let document =
            serde_json::from_value(payload).map_err(|err| StoreError::DeserializationFailed {
                key: key.clone(),
                detail: err.to_string(),
            })?;

        Ok(Versioned::new(document, decode_version(key, version)?))
    }

    #[instrument(name = "postgres.put_document", skip(self, document), fields(document = %key, expected = ?expected))]
    async fn put(
        &self,
        key: &DocumentKey,
        expected: ExpectedVersion,
        document: Self::Document,
    ) -> StoreResult<DocumentVersion> {
        let payload =
            serde_json::to_value(&document).map_err(|err| StoreError::SerializationFailed {
                key: key.clone(),
                detail: err.to_string(),
            })?;

        match expected {
            ExpectedVersion::New => {
                let result = query(
                    "INSERT INTO mintcore_documents (document_key, document, version)
                     VALUES ($1, $2, 0)
                     ON CONFLICT (document_key) DO NOTHING",
                )
                .bind(key.as_ref())
                .bind(Json(payload))
                .execute(&self.pool)
                .await
                .map_err(|err| map_sqlx_error("put", err))?;

                if result.rows_affected() == 0 {
                    let current = self
                        .current_version(key)
                        .await?
                        .unwrap_or_else(DocumentVersion::initial);
                    return Err(StoreError::VersionConflict {
                        key: key.clone(),
                        expected: None,
                        current,
                    });
                }
                Ok(DocumentVersion::initial())
            }
            ExpectedVersion::Exact(version) => {
                let expected_i64 = encode_version(key, version)?;
                let result = query(
                    "UPDATE mintcore_documents
                     SET document = $2, version = version + 1, updated_at = now()
                     WHERE document_key = $1 AND version = $3",
                )
                .bind(key.as_ref())
                .bind(Json(payload))
                .bind(expected_i64)
                .execute(&self.pool)
                .await
                .map_err(|err| map_sqlx_error("put", err))?;

                if result.rows_affected() == 0 {
                    return match self.current_version(key).await? {
                        Some(current) => Err(StoreError::VersionConflict {
                            key: key.clone(),
                            expected: Some(version),
                            current,
                        }),
                        None => Err(StoreError::DocumentNotFound(key.clone())),
                    };
                }
                Ok(version.next())
            }
            ExpectedVersion::Any => {
                let row = query(
                    "INSERT INTO mintcore_documents (document_key, document, version)
                     VALUES ($1, $2, 0)
                     ON CONFLICT (document_key) DO UPDATE
                     SET document = EXCLUDED.document,
                         version = mintcore_documents.version + 1,
                         updated_at = now()
                     RETURNING version",
                )
                .bind(key.as_ref())
                .bind(Json(payload))
                .fetch_one(&self.pool)
                .await
                .map_err(|err| map_sqlx_error("put", err))?;

                let version: i64 = row
                    .try_get("version")
                    .map_err(|err| map_sqlx_error("put", err))?;
                decode_version(key, version)
            }
        }
    }

    #[instrument(name = "postgres.document_exists", skip(self), fields(document = %key))]
    async fn exists(&self, key: &DocumentKey) -> StoreResult<bool> {
        let row = query("SELECT 1 AS one FROM mintcore_documents WHERE document_key = $1")
            .bind(key.as_ref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| map_sqlx_error("exists", err))?;

        Ok(row.is_some())
    }

    #[instrument(name = "postgres.document_version", skip(self), fields(document = %key))]
    async fn version(&self, key: &DocumentKey) -> StoreResult<Option<DocumentVersion>> {
        self.current_version(key).await
    }
}

fn encode_version(key: &DocumentKey, version: DocumentVersion) -> StoreResult<i64> {
    let raw: u64 = version.into();
    i64::try_from(raw).map_err(|_| StoreError::Internal(format!(
        "document '{key}' version {raw} exceeds the storage range"
    )))
}

fn decode_version(key: &DocumentKey, version: i64) -> StoreResult<DocumentVersion> {
    let raw = u64::try_from(version).map_err(|_| {
        StoreError::Internal(format!("document '{key}' has negative version {version}"))
    })?;
    DocumentVersion::try_new(raw)
        .map_err(|err| StoreError::Internal(format!("document '{key}' version invalid: {err}")))
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    error!(operation, error = %err, "[postgres] operation failed");
    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout(Duration::from_secs(30)),
        sqlx::Error::Io(io) => StoreError::ConnectionFailed(io.to_string()),
        sqlx::Error::PoolClosed => StoreError::Unavailable("connection pool closed".to_string()),
        other => StoreError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_reasonable() {
        let config = PostgresConfig::default();

        let max: std::num::NonZeroU32 = config.max_connections.into();
        assert_eq!(max.get(), 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
    }

    #[test]
    fn version_encoding_roundtrips() {
        let key = DocumentKey::try_new("hoodie_tb1").unwrap();
        let version = DocumentVersion::try_new(42).unwrap();

        let encoded = encode_version(&key, version).unwrap();
        assert_eq!(decode_version(&key, encoded).unwrap(), version);
    }

    #[test]
    fn negative_stored_version_is_an_internal_error() {
        let key = DocumentKey::try_new("hoodie_tb1").unwrap();

        let result = decode_version(&key, -1);

        assert!(matches!(result, Err(StoreError::Internal(_))));
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        let mapped = map_sqlx_error("get", sqlx::Error::PoolTimedOut);
        assert!(matches!(mapped, StoreError::Timeout(_)));
    }
}
