//! In-memory document store
//!
//! [`InMemoryDocumentStore`] implements the full [`DocumentStore`] contract
//! (versions, atomic batches, live snapshots) over a map held in memory. It
//! backs tests, and doubles as the local fallback backend when no database is
//! configured: with [`InMemoryDocumentStore::open`] the contents are loaded
//! from a JSON file and rewritten after every commit.

use kitroom_core::document::{
    Collection, CollectionSnapshot, CommitReceipt, CommittedWrite, Document, Version, WriteBatch,
    WriteOp,
};
use kitroom_core::document_store::{DocumentStore, DocumentStoreError, SnapshotStream};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

type CollectionMap = BTreeMap<String, (Version, serde_json::Value)>;
type Collections = BTreeMap<Collection, CollectionMap>;

/// On-disk layout of the snapshot file
type SnapshotFile = BTreeMap<Collection, Vec<Document>>;

/// Change notifications buffered per subscriber
const CHANGE_CHANNEL_CAPACITY: usize = 256;

struct Inner {
    collections: RwLock<Collections>,
    changes: broadcast::Sender<Collection>,
    snapshot_file: Option<PathBuf>,
    injected_failure: Mutex<Option<DocumentStoreError>>,
    commits: AtomicUsize,
}

/// In-memory document store with optimistic concurrency and live snapshots.
///
/// Cloning is cheap; clones share the same data.
///
/// # Example
///
/// ```
/// use kitroom_core::document::{Collection, Version, WriteBatch};
/// use kitroom_core::document_store::DocumentStore;
/// use kitroom_testing::InMemoryDocumentStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryDocumentStore::new();
/// let batch = WriteBatch::new().put(
///     Collection::Inventory,
///     "cam-1",
///     serde_json::json!({"id": "cam-1"}),
///     Some(Version::INITIAL),
/// );
/// store.commit(batch).await?;
/// assert_eq!(store.load(Collection::Inventory).await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    inner: Arc<Inner>,
}

impl InMemoryDocumentStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::with_contents(Collections::new(), None)
    }

    /// Open a store persisted to a JSON snapshot file
    ///
    /// A missing file starts an empty store; the file is created on the first
    /// commit.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: the file exists but cannot be read
    /// - `Serialization`: the file is not a valid snapshot
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DocumentStoreError> {
        let path = path.as_ref().to_path_buf();
        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file: SnapshotFile = serde_json::from_slice(&bytes)?;
                file.into_iter()
                    .map(|(collection, documents)| {
                        let docs = documents
                            .into_iter()
                            .map(|doc| (doc.id, (doc.version, doc.data)))
                            .collect();
                        (collection, docs)
                    })
                    .collect()
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Collections::new(),
            Err(error) => {
                return Err(DocumentStoreError::Unavailable(format!(
                    "cannot read {}: {error}",
                    path.display()
                )));
            },
        };

        tracing::debug!(path = %path.display(), "Opened local document snapshot");
        Ok(Self::with_contents(contents, Some(path)))
    }

    fn with_contents(collections: Collections, snapshot_file: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                collections: RwLock::new(collections),
                changes,
                snapshot_file,
                injected_failure: Mutex::new(None),
                commits: AtomicUsize::new(0),
            }),
        }
    }

    /// Make the next commit fail with `error` without writing anything
    pub async fn fail_next_commit(&self, error: DocumentStoreError) {
        *self.inner.injected_failure.lock().await = Some(error);
    }

    /// Number of successful commits so far
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    /// Number of documents in a collection
    pub async fn document_count(&self, collection: Collection) -> usize {
        self.inner
            .collections
            .read()
            .await
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    async fn snapshot(&self, collection: Collection) -> CollectionSnapshot {
        let collections = self.inner.collections.read().await;
        snapshot_of(&collections, collection)
    }

    async fn commit_batch(&self, batch: WriteBatch) -> Result<CommitReceipt, DocumentStoreError> {
        if let Some(error) = self.inner.injected_failure.lock().await.take() {
            return Err(error);
        }

        let touched = batch.collections();
        let receipt = {
            let mut collections = self.inner.collections.write().await;
            let mut working = collections.clone();
            let receipt = apply_batch(&mut working, batch)?;

            // The file is written under the lock and before the swap, so a
            // failed write leaves memory untouched and files land in commit order
            if let Some(path) = &self.inner.snapshot_file {
                write_snapshot_file(path, &snapshot_file_of(&working)).await?;
            }
            *collections = working;
            receipt
        };

        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        for collection in touched {
            let _ = self.inner.changes.send(collection);
        }
        Ok(receipt)
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("snapshot_file", &self.inner.snapshot_file)
            .field("commits", &self.commit_count())
            .finish_non_exhaustive()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn load(
        &self,
        collection: Collection,
    ) -> Pin<Box<dyn Future<Output = Result<CollectionSnapshot, DocumentStoreError>> + Send + '_>>
    {
        Box::pin(async move { Ok(self.snapshot(collection).await) })
    }

    fn commit(
        &self,
        batch: WriteBatch,
    ) -> Pin<Box<dyn Future<Output = Result<CommitReceipt, DocumentStoreError>> + Send + '_>> {
        Box::pin(self.commit_batch(batch))
    }

    fn subscribe(
        &self,
        collection: Collection,
    ) -> Pin<Box<dyn Future<Output = Result<SnapshotStream, DocumentStoreError>> + Send + '_>> {
        Box::pin(async move {
            // Subscribe before the first read so no change slips between them
            let mut changes = self.inner.changes.subscribe();
            let store = self.clone();

            let stream = async_stream::stream! {
                yield Ok(store.snapshot(collection).await);
                loop {
                    match changes.recv().await {
                        Ok(changed) if changed == collection => {
                            yield Ok(store.snapshot(collection).await);
                        },
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            yield Ok(store.snapshot(collection).await);
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };

            Ok(Box::pin(stream) as SnapshotStream)
        })
    }
}

fn snapshot_of(collections: &Collections, collection: Collection) -> CollectionSnapshot {
    let documents = collections
        .get(&collection)
        .map(|docs| {
            docs.iter()
                .map(|(id, (version, data))| Document {
                    id: id.clone(),
                    version: *version,
                    data: data.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    CollectionSnapshot {
        collection,
        documents,
    }
}

fn snapshot_file_of(collections: &Collections) -> SnapshotFile {
    Collection::ALL
        .into_iter()
        .map(|collection| (collection, snapshot_of(collections, collection).documents))
        .collect()
}

async fn write_snapshot_file(path: &Path, file: &SnapshotFile) -> Result<(), DocumentStoreError> {
    let bytes = serde_json::to_vec_pretty(file)?;
    let tmp = path.with_extension("tmp");
    let unavailable =
        |error: std::io::Error| DocumentStoreError::Unavailable(format!("{}: {error}", path.display()));

    tokio::fs::write(&tmp, bytes).await.map_err(unavailable)?;
    tokio::fs::rename(&tmp, path).await.map_err(unavailable)
}

/// Apply every write to `collections`, checking versions as it goes.
///
/// Writes later in the batch see the effect of earlier ones.
fn apply_batch(
    collections: &mut Collections,
    batch: WriteBatch,
) -> Result<CommitReceipt, DocumentStoreError> {
    let mut writes = Vec::with_capacity(batch.len());

    for op in batch.into_ops() {
        let collection = op.collection();
        let docs = collections.entry(collection).or_default();
        let current = docs.get(op.id()).map_or(Version::INITIAL, |(version, _)| *version);

        if let Some(expected) = op.expected() {
            if expected != current {
                return Err(DocumentStoreError::Conflict {
                    collection,
                    id: op.id().to_string(),
                    expected,
                    actual: current,
                });
            }
        }

        match op {
            WriteOp::Put { id, data, .. } => {
                let version = current.next();
                docs.insert(id.clone(), (version, data));
                writes.push(CommittedWrite {
                    collection,
                    id,
                    version: Some(version),
                });
            },
            WriteOp::Delete { id, .. } => {
                docs.remove(&id);
                writes.push(CommittedWrite {
                    collection,
                    id,
                    version: None,
                });
            },
        }
    }

    Ok(CommitReceipt { writes })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    fn put(id: &str, expected: Version) -> WriteBatch {
        WriteBatch::new().put(Collection::Bookings, id, json!({ "id": id }), Some(expected))
    }

    #[tokio::test]
    async fn versions_start_at_one_and_increment() {
        let store = InMemoryDocumentStore::new();
        let receipt = store.commit(put("bk-1", Version::INITIAL)).await.unwrap();
        assert_eq!(receipt.version_of(Collection::Bookings, "bk-1"), Some(Version::new(1)));

        let receipt = store.commit(put("bk-1", Version::new(1))).await.unwrap();
        assert_eq!(receipt.version_of(Collection::Bookings, "bk-1"), Some(Version::new(2)));
    }

    #[tokio::test]
    async fn stale_version_conflicts_and_writes_nothing() {
        let store = InMemoryDocumentStore::new();
        store.commit(put("bk-1", Version::INITIAL)).await.unwrap();

        let batch = WriteBatch::new()
            .put(Collection::ShootPlans, "pl-2", json!({}), Some(Version::INITIAL))
            .put(Collection::Bookings, "bk-1", json!({}), Some(Version::INITIAL));
        let error = store.commit(batch).await.unwrap_err();

        assert_eq!(
            error,
            DocumentStoreError::Conflict {
                collection: Collection::Bookings,
                id: "bk-1".into(),
                expected: Version::INITIAL,
                actual: Version::new(1),
            }
        );
        assert_eq!(store.document_count(Collection::ShootPlans).await, 0);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn unchecked_delete_of_missing_document_is_a_no_op() {
        let store = InMemoryDocumentStore::new();
        let batch = WriteBatch::new().delete(Collection::Bookings, "bk-404", None);
        let receipt = store.commit(batch).await.unwrap();
        assert_eq!(receipt.writes.len(), 1);
        assert_eq!(store.document_count(Collection::Bookings).await, 0);
    }

    #[tokio::test]
    async fn injected_failure_hits_only_the_next_commit() {
        let store = InMemoryDocumentStore::new();
        store
            .fail_next_commit(DocumentStoreError::Unavailable("offline".into()))
            .await;

        assert!(store.commit(put("bk-1", Version::INITIAL)).await.is_err());
        assert!(store.commit(put("bk-1", Version::INITIAL)).await.is_ok());
    }

    #[tokio::test]
    async fn subscription_starts_with_current_state_and_follows_changes() {
        let store = InMemoryDocumentStore::new();
        store.commit(put("bk-1", Version::INITIAL)).await.unwrap();

        let mut snapshots = store.subscribe(Collection::Bookings).await.unwrap();
        let first = snapshots.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        store
            .commit(WriteBatch::new().put(Collection::Inventory, "cam-1", json!({}), None))
            .await
            .unwrap();
        store.commit(put("bk-2", Version::INITIAL)).await.unwrap();

        let next = tokio::time::timeout(Duration::from_secs(1), snapshots.next())
            .await
            .expect("snapshot in time")
            .unwrap()
            .unwrap();
        assert_eq!(next.collection, Collection::Bookings);
        assert_eq!(next.len(), 2);
    }

    #[tokio::test]
    async fn snapshot_file_survives_reopen() {
        let path = std::env::temp_dir().join(format!("kitroom-{}.json", uuid::Uuid::new_v4()));

        let store = InMemoryDocumentStore::open(&path).await.unwrap();
        store.commit(put("bk-1", Version::INITIAL)).await.unwrap();
        drop(store);

        let reopened = InMemoryDocumentStore::open(&path).await.unwrap();
        let snapshot = reopened.load(Collection::Bookings).await.unwrap();
        assert_eq!(snapshot.get("bk-1").map(|d| d.version), Some(Version::new(1)));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_commits_all_reach_the_file() {
        let path = std::env::temp_dir().join(format!("kitroom-{}.json", uuid::Uuid::new_v4()));
        let store = InMemoryDocumentStore::open(&path).await.unwrap();

        let commits: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.commit(put(&format!("bk-{i}"), Version::INITIAL)).await
                })
            })
            .collect();
        for commit in commits {
            assert!(commit.await.unwrap().is_ok());
        }
        assert_eq!(store.commit_count(), 32);

        let reopened = InMemoryDocumentStore::open(&path).await.unwrap();
        assert_eq!(reopened.document_count(Collection::Bookings).await, 32);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn failed_file_write_leaves_memory_untouched() {
        let path = std::env::temp_dir()
            .join(format!("kitroom-missing-{}", uuid::Uuid::new_v4()))
            .join("ledger.json");
        let store = InMemoryDocumentStore::open(&path).await.unwrap();

        let error = store.commit(put("bk-1", Version::INITIAL)).await.unwrap_err();
        assert!(matches!(error, DocumentStoreError::Unavailable(_)));
        assert_eq!(store.document_count(Collection::Bookings).await, 0);
        assert_eq!(store.commit_count(), 0);
    }
}
