//! Document model for the ledger's persistence boundary.
//!
//! The ledger persists three collections of JSON documents keyed by id. Every
//! document carries a monotonic [`Version`] assigned by the store, and writes
//! are grouped into a [`WriteBatch`] that is committed atomically with a
//! per-document version check.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `Collection` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown collection: {0}")]
pub struct ParseCollectionError(String);

/// Named document collection.
///
/// The wire names match the persisted layout: `inventory`, `shootPlans`,
/// `bookings`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    /// Bookable equipment types
    #[serde(rename = "inventory")]
    Inventory,
    /// Descriptive shoot records
    #[serde(rename = "shootPlans")]
    ShootPlans,
    /// Reservation and hand-out records
    #[serde(rename = "bookings")]
    Bookings,
}

impl Collection {
    /// Every collection, in load order.
    pub const ALL: [Self; 3] = [Self::Inventory, Self::ShootPlans, Self::Bookings];

    /// Wire name of the collection.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::ShootPlans => "shootPlans",
            Self::Bookings => "bookings",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = ParseCollectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|collection| collection.as_str() == s)
            .ok_or_else(|| ParseCollectionError(s.to_string()))
    }
}

/// Document version number for optimistic concurrency control.
///
/// `Version::INITIAL` (0) means "the document does not exist". The first
/// successful write stores version 1, and every later write increments it.
///
/// # Examples
///
/// ```
/// use kitroom_core::document::Version;
///
/// let v0 = Version::INITIAL;
/// assert!(v0.is_initial());
/// assert_eq!(v0.next(), Version::new(1));
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    /// The version of a document that has never been written.
    pub const INITIAL: Self = Self(0);

    /// Create a new version.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Version after one more write.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Check if this is the "does not exist" version.
    #[must_use]
    pub const fn is_initial(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl From<Version> for u64 {
    fn from(v: Version) -> Self {
        v.0
    }
}

/// A stored document: id, current version, JSON body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id, unique within its collection
    pub id: String,
    /// Version assigned by the store on the last write
    pub version: Version,
    /// Whole-document JSON body
    pub data: serde_json::Value,
}

impl Document {
    /// Decode the body into a typed record.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Full contents of one collection at a point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    /// Which collection this is
    pub collection: Collection,
    /// Every document, ordered by id
    pub documents: Vec<Document>,
}

impl CollectionSnapshot {
    /// Snapshot of an empty collection.
    #[must_use]
    pub const fn empty(collection: Collection) -> Self {
        Self {
            collection,
            documents: Vec::new(),
        }
    }

    /// Find a document by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|doc| doc.id == id)
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True if the collection holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// A single write inside a batch.
///
/// `expected` is the version the document must currently have:
/// `Some(Version::INITIAL)` requires that it does not exist yet, `None`
/// skips the check (last write wins).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Create or overwrite a whole document
    Put {
        /// Target collection
        collection: Collection,
        /// Document id
        id: String,
        /// New body
        data: serde_json::Value,
        /// Required current version
        expected: Option<Version>,
    },
    /// Remove a document
    Delete {
        /// Target collection
        collection: Collection,
        /// Document id
        id: String,
        /// Required current version
        expected: Option<Version>,
    },
}

impl WriteOp {
    /// Collection the write targets.
    #[must_use]
    pub const fn collection(&self) -> Collection {
        match self {
            Self::Put { collection, .. } | Self::Delete { collection, .. } => *collection,
        }
    }

    /// Id of the document the write targets.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Put { id, .. } | Self::Delete { id, .. } => id,
        }
    }

    /// Version check for this write, if any.
    #[must_use]
    pub const fn expected(&self) -> Option<Version> {
        match self {
            Self::Put { expected, .. } | Self::Delete { expected, .. } => *expected,
        }
    }
}

/// Ordered group of writes committed atomically.
///
/// If any version check fails, nothing in the batch is written.
///
/// # Examples
///
/// ```
/// use kitroom_core::document::{Collection, Version, WriteBatch};
///
/// let batch = WriteBatch::new()
///     .put(Collection::ShootPlans, "pl-1", serde_json::json!({"id": "pl-1"}), Some(Version::INITIAL))
///     .delete(Collection::Bookings, "bk-0", Some(Version::new(3)));
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Add a whole-document write.
    #[must_use]
    pub fn put(
        mut self,
        collection: Collection,
        id: impl Into<String>,
        data: serde_json::Value,
        expected: Option<Version>,
    ) -> Self {
        self.ops.push(WriteOp::Put {
            collection,
            id: id.into(),
            data,
            expected,
        });
        self
    }

    /// Serialize a record and add it as a whole-document write.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if `record` cannot be serialized.
    pub fn put_record<T: Serialize>(
        self,
        collection: Collection,
        id: impl Into<String>,
        record: &T,
        expected: Option<Version>,
    ) -> Result<Self, serde_json::Error> {
        let data = serde_json::to_value(record)?;
        Ok(self.put(collection, id, data, expected))
    }

    /// Add a delete.
    #[must_use]
    pub fn delete(
        mut self,
        collection: Collection,
        id: impl Into<String>,
        expected: Option<Version>,
    ) -> Self {
        self.ops.push(WriteOp::Delete {
            collection,
            id: id.into(),
            expected,
        });
        self
    }

    /// Number of writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if the batch has no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate over the writes in order.
    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.ops.iter()
    }

    /// Consume the batch, yielding its writes.
    #[must_use]
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Distinct collections touched by the batch, sorted.
    #[must_use]
    pub fn collections(&self) -> Vec<Collection> {
        let mut collections: Vec<Collection> = self.ops.iter().map(WriteOp::collection).collect();
        collections.sort_unstable();
        collections.dedup();
        collections
    }
}

/// Outcome of one write in a committed batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedWrite {
    /// Collection written
    pub collection: Collection,
    /// Document id
    pub id: String,
    /// New version, or `None` if the document was deleted
    pub version: Option<Version>,
}

/// Versions produced by a successful commit, in batch order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// One entry per write
    pub writes: Vec<CommittedWrite>,
}

impl CommitReceipt {
    /// New version of a document written by this commit.
    #[must_use]
    pub fn version_of(&self, collection: Collection, id: &str) -> Option<Version> {
        self.writes
            .iter()
            .rev()
            .find(|write| write.collection == collection && write.id == id)
            .and_then(|write| write.version)
    }
}
