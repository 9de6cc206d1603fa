//! Ledger errors.
//!
//! Validation failures are returned before anything is written; persistence
//! failures are reported after the document store refused or timed out.
//! `LedgerError` is serializable so that it can travel inside
//! [`crate::LedgerAction`] outcomes.

use kitroom_core::document_store::DocumentStoreError;
use kitroom_runtime::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What kind of record was missing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// Inventory item
    Item,
    /// Shoot plan
    Plan,
    /// Booking
    Booking,
    /// Edit code
    EditCode,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Item => "Item",
            Self::Plan => "Plan",
            Self::Booking => "Booking",
            Self::EditCode => "Edit code",
        })
    }
}

/// Errors returned by ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerError {
    /// A referenced record does not exist
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Kind of record
        kind: EntityKind,
        /// Id or code that was looked up
        id: String,
    },

    /// The operation is not allowed in the record's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The caller supplied unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The document store rejected or failed the write
    #[error("Persistence error: {message}")]
    Persistence {
        /// Description from the lower layer
        message: String,
        /// True when another writer got there first
        conflict: bool,
    },
}

impl LedgerError {
    /// Shorthand for [`LedgerError::NotFound`]
    #[must_use]
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether the caller may simply try again
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }

    /// Whether this is a lost optimistic-concurrency race
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Persistence { conflict: true, .. })
    }
}

impl From<DocumentStoreError> for LedgerError {
    fn from(error: DocumentStoreError) -> Self {
        Self::Persistence {
            conflict: error.is_conflict(),
            message: error.to_string(),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(error: StoreError) -> Self {
        let message = match error {
            StoreError::Timeout => "Timed out waiting for the document store".to_string(),
            other => other.to_string(),
        };
        Self::Persistence {
            message,
            conflict: false,
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(error: serde_json::Error) -> Self {
        Self::Persistence {
            message: format!("Serialization failed: {error}"),
            conflict: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kitroom_core::document::{Collection, Version};

    #[test]
    fn conflicts_stay_distinguishable() {
        let error: LedgerError = DocumentStoreError::Conflict {
            collection: Collection::Bookings,
            id: "bk-1".into(),
            expected: Version::new(1),
            actual: Version::new(2),
        }
        .into();

        assert!(error.is_conflict());
        assert!(error.is_retryable());
    }

    #[test]
    fn store_timeout_is_a_persistence_error() {
        let error = LedgerError::from(StoreError::Timeout);
        assert!(matches!(error, LedgerError::Persistence { conflict: false, .. }));
        assert!(!LedgerError::InvalidInput("x".into()).is_retryable());
    }

    #[test]
    fn not_found_names_the_record() {
        let error = LedgerError::not_found(EntityKind::EditCode, "ABC234");
        assert_eq!(error.to_string(), "Edit code not found: ABC234");
    }
}
