//! `PostgreSQL` document store for Kitroom.
//!
//! [`PostgresDocumentStore`] implements the `DocumentStore` trait from
//! `kitroom-core` on a single `documents` table:
//!
//! - Whole-document JSONB bodies keyed by `(collection, id)`
//! - A `version` column checked with `SELECT ... FOR UPDATE` inside the
//!   commit transaction
//! - `pg_notify` on the `kitroom_documents` channel after every commit, which
//!   drives the snapshot subscriptions through `PgListener`
//!
//! # Example
//!
//! ```ignore
//! use kitroom_postgres::PostgresDocumentStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresDocumentStore::connect("postgres://localhost/kitroom", 10, Duration::from_secs(30)).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use kitroom_core::document::{
    Collection, CollectionSnapshot, CommitReceipt, CommittedWrite, Document, Version, WriteBatch,
    WriteOp,
};
use kitroom_core::document_store::{DocumentStore, DocumentStoreError, SnapshotStream};
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Notification channel carrying the name of the changed collection
pub const NOTIFY_CHANNEL: &str = "kitroom_documents";

/// `PostgreSQL`-backed document store.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Unavailable`] if the database cannot be
    /// reached within `connect_timeout`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, DocumentStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .map_err(|e| DocumentStoreError::Unavailable(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Create a store over an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `documents` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Database`] if the DDL fails.
    pub async fn migrate(&self) -> Result<(), DocumentStoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                version BIGINT NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (collection, id)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        tracing::info!("documents table ready");
        Ok(())
    }

    async fn load_collection(
        &self,
        collection: Collection,
    ) -> Result<CollectionSnapshot, DocumentStoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, version, data
            FROM documents
            WHERE collection = $1
            ORDER BY id
            ",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(database_error)?;

        let documents = rows
            .iter()
            .map(|row| {
                Ok(Document {
                    id: row.try_get("id").map_err(database_error)?,
                    version: from_db_version(row.try_get("version").map_err(database_error)?)?,
                    data: row.try_get("data").map_err(database_error)?,
                })
            })
            .collect::<Result<Vec<_>, DocumentStoreError>>()?;

        Ok(CollectionSnapshot {
            collection,
            documents,
        })
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<CommitReceipt, DocumentStoreError> {
        let start = std::time::Instant::now();
        let touched = batch.collections();
        let mut tx = self.pool.begin().await.map_err(database_error)?;
        let mut writes = Vec::with_capacity(batch.len());

        for op in batch.into_ops() {
            writes.push(apply_write(&mut tx, op).await?);
        }

        for collection in &touched {
            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(NOTIFY_CHANNEL)
                .bind(collection.as_str())
                .execute(&mut *tx)
                .await
                .map_err(database_error)?;
        }

        tx.commit().await.map_err(database_error)?;

        metrics::histogram!("document_store.commit.duration_seconds")
            .record(start.elapsed().as_secs_f64());
        tracing::debug!(writes = writes.len(), "Committed batch");

        Ok(CommitReceipt { writes })
    }
}

/// Lock the row, check its version and apply one write inside `tx`.
async fn apply_write(
    tx: &mut Transaction<'_, Postgres>,
    op: WriteOp,
) -> Result<CommittedWrite, DocumentStoreError> {
    let collection = op.collection();
    let current = current_version(tx, collection, op.id()).await?;

    if let Some(expected) = op.expected() {
        if expected != current.unwrap_or(Version::INITIAL) {
            return Err(DocumentStoreError::Conflict {
                collection,
                id: op.id().to_string(),
                expected,
                actual: current.unwrap_or(Version::INITIAL),
            });
        }
    }

    match op {
        WriteOp::Put { id, data, expected, .. } => {
            let version = current.unwrap_or(Version::INITIAL).next();
            let affected = if current.is_some() {
                sqlx::query(
                    r"
                    UPDATE documents
                    SET version = $3, data = $4, updated_at = now()
                    WHERE collection = $1 AND id = $2
                    ",
                )
                .bind(collection.as_str())
                .bind(&id)
                .bind(to_db_version(version)?)
                .bind(&data)
                .execute(&mut **tx)
                .await
                .map_err(database_error)?
                .rows_affected()
            } else {
                sqlx::query(
                    r"
                    INSERT INTO documents (collection, id, version, data)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (collection, id) DO NOTHING
                    ",
                )
                .bind(collection.as_str())
                .bind(&id)
                .bind(to_db_version(version)?)
                .bind(&data)
                .execute(&mut **tx)
                .await
                .map_err(database_error)?
                .rows_affected()
            };

            // A concurrent transaction inserted the row after our locking read
            if affected == 0 {
                let actual = current_version(tx, collection, &id)
                    .await?
                    .unwrap_or(Version::INITIAL);
                return Err(DocumentStoreError::Conflict {
                    collection,
                    id,
                    expected: expected.unwrap_or(Version::INITIAL),
                    actual,
                });
            }

            Ok(CommittedWrite {
                collection,
                id,
                version: Some(version),
            })
        },
        WriteOp::Delete { id, .. } => {
            sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection.as_str())
                .bind(&id)
                .execute(&mut **tx)
                .await
                .map_err(database_error)?;

            Ok(CommittedWrite {
                collection,
                id,
                version: None,
            })
        },
    }
}

async fn current_version(
    tx: &mut Transaction<'_, Postgres>,
    collection: Collection,
    id: &str,
) -> Result<Option<Version>, DocumentStoreError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT version FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
    )
    .bind(collection.as_str())
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(database_error)?;

    row.map(|(version,)| from_db_version(version)).transpose()
}

fn to_db_version(version: Version) -> Result<i64, DocumentStoreError> {
    i64::try_from(version.value())
        .map_err(|_| DocumentStoreError::Database(format!("version {version} out of range")))
}

fn from_db_version(version: i64) -> Result<Version, DocumentStoreError> {
    u64::try_from(version)
        .map(Version::new)
        .map_err(|_| DocumentStoreError::Database(format!("negative version {version}")))
}

fn database_error(error: sqlx::Error) -> DocumentStoreError {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            DocumentStoreError::Unavailable(error.to_string())
        },
        other => DocumentStoreError::Database(other.to_string()),
    }
}

impl DocumentStore for PostgresDocumentStore {
    fn load(
        &self,
        collection: Collection,
    ) -> Pin<Box<dyn Future<Output = Result<CollectionSnapshot, DocumentStoreError>> + Send + '_>>
    {
        Box::pin(self.load_collection(collection))
    }

    fn commit(
        &self,
        batch: WriteBatch,
    ) -> Pin<Box<dyn Future<Output = Result<CommitReceipt, DocumentStoreError>> + Send + '_>> {
        Box::pin(async move {
            let result = self.commit_batch(batch).await;
            if let Err(error) = &result {
                if error.is_conflict() {
                    tracing::warn!(error = %error, "Commit rejected");
                } else {
                    tracing::error!(error = %error, "Commit failed");
                }
            }
            result
        })
    }

    fn subscribe(
        &self,
        collection: Collection,
    ) -> Pin<Box<dyn Future<Output = Result<SnapshotStream, DocumentStoreError>> + Send + '_>> {
        Box::pin(async move {
            // Listen before the first load so no change slips between them
            let mut listener = PgListener::connect_with(&self.pool)
                .await
                .map_err(database_error)?;
            listener.listen(NOTIFY_CHANNEL).await.map_err(database_error)?;

            let store = self.clone();
            let stream = async_stream::stream! {
                yield store.load_collection(collection).await;
                loop {
                    match listener.recv().await {
                        Ok(notification) if notification.payload() == collection.as_str() => {
                            yield store.load_collection(collection).await;
                        },
                        Ok(_) => {},
                        Err(error) => {
                            tracing::error!(error = %error, %collection, "Snapshot listener failed");
                            yield Err(database_error(error));
                            break;
                        },
                    }
                }
            };

            Ok(Box::pin(stream) as SnapshotStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_round_trip_through_bigint() {
        assert_eq!(to_db_version(Version::new(7)), Ok(7));
        assert_eq!(from_db_version(7), Ok(Version::new(7)));
        assert!(from_db_version(-1).is_err());
        assert!(to_db_version(Version::new(u64::MAX)).is_err());
    }

    #[test]
    fn pool_errors_mean_unavailable() {
        assert!(matches!(
            database_error(sqlx::Error::PoolTimedOut),
            DocumentStoreError::Unavailable(_)
        ));
        assert!(matches!(
            database_error(sqlx::Error::RowNotFound),
            DocumentStoreError::Database(_)
        ));
    }
}
