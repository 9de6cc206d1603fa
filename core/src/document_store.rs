//! Document store trait and related types.
//!
//! A document store holds the ledger's collections and offers exactly three
//! things:
//!
//! - Load a whole collection with per-document versions
//! - Commit a batch of whole-document writes atomically, with optimistic
//!   concurrency checks
//! - Subscribe to full-collection snapshots pushed after every change
//!
//! # Implementations
//!
//! - `PostgresDocumentStore` (in `kitroom-postgres`): networked backend
//! - `InMemoryDocumentStore` (in `kitroom-testing`): tests and local fallback
//!
//! # Example
//!
//! ```no_run
//! use kitroom_core::document::{Collection, Version, WriteBatch};
//! use kitroom_core::document_store::{DocumentStore, DocumentStoreError};
//!
//! async fn example<S: DocumentStore>(store: &S) -> Result<(), DocumentStoreError> {
//!     let batch = WriteBatch::new().put(
//!         Collection::Inventory,
//!         "cam-1",
//!         serde_json::json!({"id": "cam-1", "totalStock": 5}),
//!         Some(Version::INITIAL),
//!     );
//!     let receipt = store.commit(batch).await?;
//!     assert_eq!(receipt.version_of(Collection::Inventory, "cam-1"), Some(Version::new(1)));
//!
//!     let snapshot = store.load(Collection::Inventory).await?;
//!     assert_eq!(snapshot.len(), 1);
//!     Ok(())
//! }
//! ```

use crate::document::{Collection, CollectionSnapshot, CommitReceipt, Version, WriteBatch};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Stream of full-collection snapshots.
///
/// The first item is the collection's current state; later items follow
/// every committed change to it.
pub type SnapshotStream =
    Pin<Box<dyn Stream<Item = Result<CollectionSnapshot, DocumentStoreError>> + Send>>;

/// Errors that can occur during document store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentStoreError {
    /// Optimistic concurrency conflict: the document moved on since it was read.
    ///
    /// The whole batch was rejected; nothing was written.
    #[error("Version conflict on {collection}/{id}: expected {expected}, found {actual}")]
    Conflict {
        /// Collection of the conflicting document
        collection: Collection,
        /// Id of the conflicting document
        id: String,
        /// Version the writer expected
        expected: Version,
        /// Version actually stored (`INITIAL` if absent)
        actual: Version,
    },

    /// Backend cannot be reached.
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// A snapshot subscription ended.
    #[error("Snapshot subscription closed")]
    SubscriptionClosed,
}

impl DocumentStoreError {
    /// True for optimistic concurrency conflicts.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<serde_json::Error> for DocumentStoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Document store abstraction.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a single store can be shared by
/// the runtime, the snapshot pump and every effect that captures it.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
/// trait can be used as `Arc<dyn DocumentStore>` inside effects.
pub trait DocumentStore: Send + Sync {
    /// Load every document in a collection.
    ///
    /// A collection that was never written is returned as an empty snapshot.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `Database`: backend failure
    /// - `Serialization`: stored body is not valid JSON
    fn load(
        &self,
        collection: Collection,
    ) -> Pin<Box<dyn Future<Output = Result<CollectionSnapshot, DocumentStoreError>> + Send + '_>>;

    /// Commit a batch of writes atomically.
    ///
    /// Every write with `expected: Some(v)` is checked against the stored
    /// version first. Deleting a document that does not exist with no version
    /// check is a no-op.
    ///
    /// # Errors
    ///
    /// - `Conflict`: a version check failed; nothing was written
    /// - `Unavailable` / `Database`: backend failure
    fn commit(
        &self,
        batch: WriteBatch,
    ) -> Pin<Box<dyn Future<Output = Result<CommitReceipt, DocumentStoreError>> + Send + '_>>;

    /// Subscribe to full-collection snapshots.
    ///
    /// # Errors
    ///
    /// - `Unavailable` / `Database`: the subscription could not be set up
    fn subscribe(
        &self,
        collection: Collection,
    ) -> Pin<Box<dyn Future<Output = Result<SnapshotStream, DocumentStoreError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_distinguishable() {
        let conflict = DocumentStoreError::Conflict {
            collection: Collection::Bookings,
            id: "bk-1".into(),
            expected: Version::new(2),
            actual: Version::new(3),
        };
        assert!(conflict.is_conflict());
        assert_eq!(
            conflict.to_string(),
            "Version conflict on bookings/bk-1: expected 2, found 3"
        );
        assert!(!DocumentStoreError::SubscriptionClosed.is_conflict());
    }

    #[test]
    fn serde_errors_convert() {
        let err = serde_json::from_str::<u8>("nope").map_err(DocumentStoreError::from);
        assert!(matches!(err, Err(DocumentStoreError::Serialization(_))));
    }
}
