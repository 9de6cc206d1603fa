//! # Kitroom Testing
//!
//! Testing utilities for the Kitroom reservation ledger.
//!
//! This crate provides:
//! - [`FixedClock`] for deterministic timestamps
//! - [`ReducerTest`], a Given-When-Then harness for reducers, plus effect
//!   assertions
//! - [`InMemoryDocumentStore`], the in-memory [`DocumentStore`] used by tests
//!   and as the local fallback backend
//!
//! [`DocumentStore`]: kitroom_core::document_store::DocumentStore
//!
//! ## Example
//!
//! ```ignore
//! use kitroom_testing::{test_clock, InMemoryDocumentStore};
//!
//! #[tokio::test]
//! async fn creates_a_booking() {
//!     let documents = Arc::new(InMemoryDocumentStore::new());
//!     let ledger = ReservationLedger::start(documents, Arc::new(test_clock()), settings).await?;
//!     // ...
//! }
//! ```

use chrono::{DateTime, Utc};
use kitroom_core::environment::Clock;

mod document_store;
mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use kitroom_testing::mocks::FixedClock;
    /// use kitroom_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-09-01 08:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_756_713_600, 0).unwrap_or_default())
    }
}

// Re-export commonly used items
pub use document_store::InMemoryDocumentStore;
pub use mocks::{test_clock, FixedClock};
pub use reducer_test::{assertions, ReducerTest};
