//! Declarative macros for document store effects
//!
//! These macros cut the boilerplate of boxing callbacks and cloning the store
//! handle when a reducer returns an `Effect::DocumentStore`.

/// Create an `Effect::DocumentStore` with a `Commit` operation
///
/// # Example
///
/// ```rust,ignore
/// use kitroom_core::commit_batch;
///
/// commit_batch! {
///     store: env.documents,
///     batch: batch,
///     on_success: |receipt| Some(LedgerAction::Committed { request_id, receipt }),
///     on_error: |error| Some(LedgerAction::CommitFailed { request_id, error: error.to_string() })
/// }
/// ```
#[macro_export]
macro_rules! commit_batch {
    (
        store: $store:expr,
        batch: $batch:expr,
        on_success: |$success_param:ident| $success_body:expr,
        on_error: |$error_param:ident| $error_body:expr
    ) => {
        $crate::effect::Effect::DocumentStore($crate::effect::DocumentStoreOperation::Commit {
            document_store: ::std::sync::Arc::clone(&$store),
            batch: $batch,
            on_success: ::std::boxed::Box::new(move |$success_param| $success_body),
            on_error: ::std::boxed::Box::new(move |$error_param| $error_body),
        })
    };
}

/// Create an `Effect::DocumentStore` with a `Load` operation
///
/// # Example
///
/// ```rust,ignore
/// use kitroom_core::load_collection;
///
/// load_collection! {
///     store: env.documents,
///     collection: Collection::Bookings,
///     on_success: |snapshot| Some(LedgerAction::SnapshotReceived { snapshot }),
///     on_error: |error| Some(LedgerAction::SyncFailed { error: error.to_string() })
/// }
/// ```
#[macro_export]
macro_rules! load_collection {
    (
        store: $store:expr,
        collection: $collection:expr,
        on_success: |$success_param:ident| $success_body:expr,
        on_error: |$error_param:ident| $error_body:expr
    ) => {
        $crate::effect::Effect::DocumentStore($crate::effect::DocumentStoreOperation::Load {
            document_store: ::std::sync::Arc::clone(&$store),
            collection: $collection,
            on_success: ::std::boxed::Box::new(move |$success_param| $success_body),
            on_error: ::std::boxed::Box::new(move |$error_param| $error_body),
        })
    };
}

/// Create an `Effect::Future` that immediately yields an action
///
/// Used to feed an outcome back through the runtime so that
/// `send_and_wait_for` observers see it.
///
/// # Example
///
/// ```rust,ignore
/// use kitroom_core::emit;
///
/// emit!(LedgerAction::CommandRejected { request_id, error })
/// ```
#[macro_export]
macro_rules! emit {
    ($action:expr) => {{
        let action = $action;
        $crate::effect::Effect::Future(::std::boxed::Box::pin(async move { Some(action) }))
    }};
}
