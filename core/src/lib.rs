//! # Kitroom Core
//!
//! Core traits and types for the Kitroom reservation ledger.
//!
//! The ledger is built with the Reducer pattern: all business logic lives in a
//! pure function over explicit state, and every interaction with the outside
//! world (the document store, timers) is returned as an effect description for
//! the runtime to execute.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature (the synced collections)
//! - **Action**: All possible inputs to a reducer (commands, snapshots, outcomes)
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits
//! - **Document store**: The persistence boundary, see [`document_store`]
//!
//! ## Example
//!
//! ```ignore
//! use kitroom_core::*;
//!
//! impl Reducer for LedgerReducer {
//!     type State = LedgerState;
//!     type Action = LedgerAction;
//!     type Environment = LedgerEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut LedgerState,
//!         action: LedgerAction,
//!         env: &LedgerEnvironment,
//!     ) -> SmallVec<[Effect<LedgerAction>; 4]> {
//!         // Business logic goes here
//!         SmallVec::new()
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

/// Document model: collections, versions, write batches, snapshots
pub mod document;

/// Persistence boundary trait and errors
pub mod document_store;

/// Declarative macros for building document store effects
mod effect_macros;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Most actions produce zero to two effects, so the result is a
        /// `SmallVec` that stays on the stack in the common case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution) and are composable.
pub mod effect {
    use crate::document::{Collection, CollectionSnapshot, CommitReceipt, WriteBatch};
    use crate::document_store::{DocumentStore, DocumentStoreError};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::time::Duration;

    /// Callback invoked with a successful commit receipt.
    pub type CommitCallback<Action> = Box<dyn FnOnce(CommitReceipt) -> Option<Action> + Send>;

    /// Callback invoked with a freshly loaded collection.
    pub type LoadCallback<Action> = Box<dyn FnOnce(CollectionSnapshot) -> Option<Action> + Send>;

    /// Callback invoked when a document store operation fails.
    pub type ErrorCallback<Action> = Box<dyn FnOnce(DocumentStoreError) -> Option<Action> + Send>;

    /// Document store operation executed by the runtime.
    ///
    /// Both variants carry callbacks that turn the outcome into an optional
    /// action, which the runtime feeds back into the reducer.
    pub enum DocumentStoreOperation<Action> {
        /// Commit a batch of writes atomically
        Commit {
            /// Store to write to
            document_store: Arc<dyn DocumentStore>,
            /// Writes with their expected versions
            batch: WriteBatch,
            /// Called with the new versions on success
            on_success: CommitCallback<Action>,
            /// Called with the store error on failure
            on_error: ErrorCallback<Action>,
        },

        /// Load a full collection
        Load {
            /// Store to read from
            document_store: Arc<dyn DocumentStore>,
            /// Collection to load
            collection: Collection,
            /// Called with the snapshot on success
            on_success: LoadCallback<Action>,
            /// Called with the store error on failure
            on_error: ErrorCallback<Action>,
        },
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Document store read or write
        DocumentStore(DocumentStoreOperation<Action>),
    }

    // Manual Debug implementation since Future and callbacks don't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::DocumentStore(DocumentStoreOperation::Commit { batch, .. }) => f
                    .debug_struct("Effect::DocumentStore::Commit")
                    .field("writes", &batch.len())
                    .finish(),
                Effect::DocumentStore(DocumentStoreOperation::Load { collection, .. }) => f
                    .debug_struct("Effect::DocumentStore::Load")
                    .field("collection", collection)
                    .finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Returns the write batch if this is a commit effect
        #[must_use]
        pub const fn as_commit(&self) -> Option<&WriteBatch> {
            match self {
                Effect::DocumentStore(DocumentStoreOperation::Commit { batch, .. }) => Some(batch),
                _ => None,
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
