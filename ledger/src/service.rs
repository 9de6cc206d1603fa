//! The [`ReservationLedger`] handle.
//!
//! Owns the [`Store`] running [`LedgerReducer`] and one snapshot pump per
//! collection. Every mutating call sends a command and waits for the
//! outcome carrying its [`RequestId`]; every read is a closure over the
//! current [`LedgerState`].

use crate::access::{TeacherAccess, TeacherPin};
use crate::config::Config;
use crate::edit_code::{EditCodeSource, RandomEditCodes};
use crate::error::LedgerError;
use crate::packing::PackingList;
use crate::reducer::{LedgerAction, LedgerEnvironment, LedgerReducer, LedgerState};
use crate::types::{
    BookingId, BookingRequest, CreatedPlan, InventoryItem, PlanDraft, PlanId, PlanWithBooking,
    RequestId,
};
use futures::StreamExt;
use kitroom_core::document::Collection;
use kitroom_core::document_store::{DocumentStore, SnapshotStream};
use kitroom_core::environment::{Clock, SystemClock};
use kitroom_runtime::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type LedgerStore = Store<LedgerState, LedgerAction, LedgerEnvironment, LedgerReducer>;

/// How often `wait_until_synced` looks at the state
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runtime options of a [`ReservationLedger`]
#[derive(Clone)]
pub struct LedgerOptions {
    /// PIN guarding teacher operations
    pub teacher_pin: TeacherPin,
    /// How long a mutating call waits for its outcome
    pub command_timeout: Duration,
    /// Pause before a snapshot pump subscribes again
    pub resubscribe_delay: Duration,
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Edit code source
    pub edit_codes: Arc<dyn EditCodeSource>,
}

impl LedgerOptions {
    /// Options from the loaded configuration, with the system clock
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidInput`] if the configured PIN is not four digits.
    pub fn from_config(config: &Config) -> Result<Self, LedgerError> {
        Ok(Self {
            teacher_pin: TeacherPin::new(&config.teacher_pin)?,
            command_timeout: config.command_timeout(),
            ..Self::default()
        })
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the edit code source
    #[must_use]
    pub fn with_edit_codes(mut self, edit_codes: Arc<dyn EditCodeSource>) -> Self {
        self.edit_codes = edit_codes;
        self
    }
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            teacher_pin: TeacherPin::default(),
            command_timeout: Duration::from_secs(5),
            resubscribe_delay: Duration::from_secs(1),
            clock: Arc::new(SystemClock),
            edit_codes: Arc::new(RandomEditCodes),
        }
    }
}

impl std::fmt::Debug for LedgerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerOptions")
            .field("teacher_pin", &self.teacher_pin)
            .field("command_timeout", &self.command_timeout)
            .field("resubscribe_delay", &self.resubscribe_delay)
            .finish_non_exhaustive()
    }
}

/// The reservation ledger, as held by callers
pub struct ReservationLedger {
    store: LedgerStore,
    pin: TeacherPin,
    command_timeout: Duration,
    shutdown: broadcast::Sender<()>,
    pumps: Vec<JoinHandle<()>>,
}

impl ReservationLedger {
    /// Start the ledger over `documents` and begin streaming snapshots
    ///
    /// Returns immediately; use [`Self::wait_until_synced`] before relying on
    /// reads.
    pub fn start(documents: Arc<dyn DocumentStore>, options: LedgerOptions) -> Self {
        let environment = LedgerEnvironment::new(
            options.clock,
            Arc::clone(&documents),
            options.edit_codes,
        );
        let store = Store::new(LedgerState::new(), LedgerReducer::new(), environment);
        let (shutdown, _) = broadcast::channel(1);

        let pumps = Collection::ALL
            .into_iter()
            .map(|collection| {
                SnapshotPump {
                    collection,
                    documents: Arc::clone(&documents),
                    store: store.clone(),
                    shutdown: shutdown.subscribe(),
                    retry_delay: options.resubscribe_delay,
                }
                .spawn()
            })
            .collect();

        info!("Reservation ledger started");
        Self {
            store,
            pin: options.teacher_pin,
            command_timeout: options.command_timeout,
            shutdown,
            pumps,
        }
    }

    /// Wait until every collection has delivered its first snapshot
    ///
    /// # Errors
    ///
    /// [`LedgerError::Persistence`] if that takes longer than `timeout`.
    pub async fn wait_until_synced(&self, timeout: Duration) -> Result<(), LedgerError> {
        tokio::time::timeout(timeout, async {
            while !self.store.state(LedgerState::is_synced).await {
                tokio::time::sleep(SYNC_POLL_INTERVAL).await;
            }
        })
        .await
        .map_err(|_| LedgerError::Persistence {
            message: "Timed out waiting for the initial snapshots".to_string(),
            conflict: false,
        })
    }

    /// Whether every collection has delivered its first snapshot
    pub async fn is_synced(&self) -> bool {
        self.store.state(LedgerState::is_synced).await
    }

    /// Trade the entered PIN for teacher access
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidInput`] if the PIN is wrong.
    pub fn unlock(&self, pin: &str) -> Result<TeacherAccess, LedgerError> {
        self.pin.unlock(pin)
    }

    // ========== Reads ==========

    /// Remaining bookable units of an item; 0 for unknown items
    ///
    /// Pass the booking being edited as `exclude` so its own lines count as free.
    pub async fn available_count(&self, item_id: &str, exclude: Option<&BookingId>) -> i64 {
        self.store
            .state(|state| state.available_count(item_id, exclude))
            .await
    }

    /// Inventory in catalog order
    pub async fn inventory(&self) -> Vec<InventoryItem> {
        self.store.state(LedgerState::inventory_in_catalog_order).await
    }

    /// Sorted unique categories
    pub async fn categories(&self) -> Vec<String> {
        self.store.state(LedgerState::categories).await
    }

    /// Every plan with its booking, newest first
    pub async fn dashboard(
        &self,
        _access: &TeacherAccess,
        class_filter: Option<&str>,
    ) -> Vec<PlanWithBooking> {
        self.store.state(|state| state.dashboard(class_filter)).await
    }

    /// Packing list of a booking
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] if the booking or its plan is missing.
    pub async fn packing_list(
        &self,
        _access: &TeacherAccess,
        booking_id: &BookingId,
    ) -> Result<PackingList, LedgerError> {
        self.store.state(|state| state.packing_list(booking_id)).await
    }

    /// Plan and still-pending booking for an edit code
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidInput`] for an empty code
    /// - [`LedgerError::NotFound`] for an unknown code or a plan without booking
    /// - [`LedgerError::InvalidState`] once the booking left `pending`
    pub async fn load_plan_by_code(&self, code: &str) -> Result<PlanWithBooking, LedgerError> {
        self.store.state(|state| state.lookup_edit_code(code)).await
    }

    // ========== Student commands ==========

    /// Submit a new plan and its booking
    ///
    /// # Errors
    ///
    /// Validation errors, or [`LedgerError::Persistence`] if the write fails.
    pub async fn create_plan(
        &self,
        draft: PlanDraft,
        request: BookingRequest,
    ) -> Result<CreatedPlan, LedgerError> {
        let request_id = RequestId::new();
        let outcome = self
            .execute(
                request_id,
                LedgerAction::CreatePlan {
                    request_id,
                    plan_id: PlanId::generate(),
                    booking_id: BookingId::generate(),
                    draft,
                    request,
                },
            )
            .await?;
        match outcome {
            LedgerAction::PlanCreated { created, .. } => {
                info!(plan = %created.plan_id, "Plan created");
                Ok(created)
            },
            other => Err(unexpected(&other)),
        }
    }

    /// Replace a pending plan and its requested equipment
    ///
    /// # Errors
    ///
    /// Validation errors, [`LedgerError::InvalidState`] if the booking is no
    /// longer pending, or [`LedgerError::Persistence`].
    pub async fn update_plan(
        &self,
        plan_id: &PlanId,
        draft: PlanDraft,
        request: BookingRequest,
    ) -> Result<(), LedgerError> {
        let request_id = RequestId::new();
        self.execute(
            request_id,
            LedgerAction::UpdatePlan {
                request_id,
                plan_id: plan_id.clone(),
                draft,
                request,
            },
        )
        .await
        .map(drop)
    }

    // ========== Teacher commands ==========

    /// Delete a plan together with its bookings
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown plan, or [`LedgerError::Persistence`].
    pub async fn delete_plan(
        &self,
        _access: &TeacherAccess,
        plan_id: &PlanId,
    ) -> Result<(), LedgerError> {
        let request_id = RequestId::new();
        self.run(LedgerAction::DeletePlan {
            request_id,
            plan_id: plan_id.clone(),
        })
        .await
    }

    /// Stage every line for hand-out
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidState`] once the booking was handed out.
    pub async fn pack(
        &self,
        _access: &TeacherAccess,
        booking_id: &BookingId,
    ) -> Result<(), LedgerError> {
        self.run(LedgerAction::PackBooking {
            request_id: RequestId::new(),
            booking_id: booking_id.clone(),
        })
        .await
    }

    /// Flip one line between nothing and everything handed out
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown booking or line,
    /// [`LedgerError::InvalidState`] once the booking was handed out.
    pub async fn toggle_handout(
        &self,
        _access: &TeacherAccess,
        booking_id: &BookingId,
        item_id: &str,
    ) -> Result<(), LedgerError> {
        self.run(LedgerAction::ToggleHandout {
            request_id: RequestId::new(),
            booking_id: booking_id.clone(),
            item_id: item_id.to_string(),
        })
        .await
    }

    /// Tag specific units and note something on one line
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown booking or line.
    pub async fn annotate_item(
        &self,
        _access: &TeacherAccess,
        booking_id: &BookingId,
        item_id: &str,
        specific_ids: Vec<String>,
        notes: String,
    ) -> Result<(), LedgerError> {
        self.run(LedgerAction::AnnotateItem {
            request_id: RequestId::new(),
            booking_id: booking_id.clone(),
            item_id: item_id.to_string(),
            specific_ids,
            notes,
        })
        .await
    }

    /// Record the student's signature
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidInput`] for a blank signature,
    /// [`LedgerError::InvalidState`] once the booking was handed out.
    pub async fn capture_signature(
        &self,
        _access: &TeacherAccess,
        booking_id: &BookingId,
        signature: &str,
    ) -> Result<(), LedgerError> {
        self.run(LedgerAction::CaptureSignature {
            request_id: RequestId::new(),
            booking_id: booking_id.clone(),
            signature: signature.to_string(),
        })
        .await
    }

    /// Drop the signature so the student can sign again
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidState`] once the booking was handed out.
    pub async fn clear_signature(
        &self,
        _access: &TeacherAccess,
        booking_id: &BookingId,
    ) -> Result<(), LedgerError> {
        self.run(LedgerAction::ClearSignature {
            request_id: RequestId::new(),
            booking_id: booking_id.clone(),
        })
        .await
    }

    /// Hand the equipment over
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidInput`] without a signature,
    /// [`LedgerError::InvalidState`] once the booking was handed out.
    pub async fn activate(
        &self,
        _access: &TeacherAccess,
        booking_id: &BookingId,
        signature: Option<&str>,
    ) -> Result<(), LedgerError> {
        self.run(LedgerAction::ActivateBooking {
            request_id: RequestId::new(),
            booking_id: booking_id.clone(),
            signature: signature.map(ToString::to_string),
        })
        .await
    }

    /// Flip one line between fully returned and not returned
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown booking or line.
    pub async fn toggle_returned(
        &self,
        _access: &TeacherAccess,
        booking_id: &BookingId,
        item_id: &str,
    ) -> Result<(), LedgerError> {
        self.run(LedgerAction::ToggleReturned {
            request_id: RequestId::new(),
            booking_id: booking_id.clone(),
            item_id: item_id.to_string(),
        })
        .await
    }

    /// Mark every line fully returned
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown booking.
    pub async fn mark_all_returned(
        &self,
        _access: &TeacherAccess,
        booking_id: &BookingId,
    ) -> Result<(), LedgerError> {
        self.run(LedgerAction::MarkAllReturned {
            request_id: RequestId::new(),
            booking_id: booking_id.clone(),
        })
        .await
    }

    /// Add a new inventory item
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidInput`] for a duplicate id or a missing name.
    pub async fn add_inventory_item(
        &self,
        _access: &TeacherAccess,
        item: InventoryItem,
    ) -> Result<(), LedgerError> {
        self.run(LedgerAction::AddInventoryItem {
            request_id: RequestId::new(),
            item,
        })
        .await
    }

    /// Overwrite an existing inventory item
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown item.
    pub async fn update_inventory_item(
        &self,
        _access: &TeacherAccess,
        item: InventoryItem,
    ) -> Result<(), LedgerError> {
        self.run(LedgerAction::UpdateInventoryItem {
            request_id: RequestId::new(),
            item,
        })
        .await
    }

    /// Overwrite only the maintenance note of an item; blank clears it
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] for an unknown item.
    pub async fn set_maintenance_note(
        &self,
        _access: &TeacherAccess,
        item_id: &str,
        note: &str,
    ) -> Result<(), LedgerError> {
        self.run(LedgerAction::SetMaintenanceNote {
            request_id: RequestId::new(),
            item_id: item_id.to_string(),
            note: note.to_string(),
        })
        .await
    }

    /// Reload every collection from the store
    ///
    /// # Errors
    ///
    /// [`LedgerError::Persistence`] if the ledger is shutting down.
    pub async fn resync(&self) -> Result<(), LedgerError> {
        self.store.send(LedgerAction::Resync).await?;
        Ok(())
    }

    /// Stop the snapshot pumps and wait for in-flight writes
    ///
    /// # Errors
    ///
    /// [`LedgerError::Persistence`] if writes are still running after `timeout`.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), LedgerError> {
        let _ = self.shutdown.send(());
        for pump in self.pumps {
            if let Err(error) = pump.await {
                warn!(error = %error, "Snapshot pump ended abnormally");
            }
        }
        self.store.shutdown(timeout).await?;
        info!("Reservation ledger stopped");
        Ok(())
    }

    // ========== Plumbing ==========

    /// Send a command and wait for its outcome; rejections become `Err`
    #[tracing::instrument(skip(self, action), fields(action = action.action_name()))]
    async fn execute(
        &self,
        request_id: RequestId,
        action: LedgerAction,
    ) -> Result<LedgerAction, LedgerError> {
        let outcome = self
            .store
            .send_and_wait_for(
                action,
                move |candidate: &LedgerAction| {
                    candidate.is_outcome() && candidate.request_id() == Some(&request_id)
                },
                self.command_timeout,
            )
            .await?;

        match outcome {
            LedgerAction::CommandRejected { error, .. } => Err(error),
            LedgerAction::CommitFailed { error, .. } => {
                error!(%request_id, error = %error, "Write failed");
                Err(error)
            },
            other => {
                debug!(%request_id, outcome = other.action_name(), "Command finished");
                Ok(other)
            },
        }
    }

    /// [`Self::execute`] for commands that answer with nothing but success
    async fn run(&self, action: LedgerAction) -> Result<(), LedgerError> {
        let Some(request_id) = action.request_id().copied() else {
            return Err(unexpected(&action));
        };
        match self.execute(request_id, action).await? {
            LedgerAction::Committed { .. } | LedgerAction::Unchanged { .. } => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

impl std::fmt::Debug for ReservationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationLedger")
            .field("command_timeout", &self.command_timeout)
            .field("pumps", &self.pumps.len())
            .finish_non_exhaustive()
    }
}

fn unexpected(action: &LedgerAction) -> LedgerError {
    LedgerError::InvalidState(format!("Unexpected answer {}", action.action_name()))
}

/// Forwards the snapshots of one collection into the store
///
/// Subscribes, forwards until the stream ends, then subscribes again after
/// `retry_delay`. Stops on the shutdown signal or once the store refuses
/// actions.
struct SnapshotPump {
    collection: Collection,
    documents: Arc<dyn DocumentStore>,
    store: LedgerStore,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
}

impl SnapshotPump {
    fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        let collection = self.collection;
        debug!(%collection, "Snapshot pump started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => break,
                subscribed = self.documents.subscribe(collection) => {
                    match subscribed {
                        Ok(mut stream) => {
                            if !self.forward(&mut stream).await {
                                break;
                            }
                            warn!(%collection, "Snapshot stream ended, subscribing again");
                        },
                        Err(error) => {
                            let action = LedgerAction::SyncFailed {
                                collection,
                                error: error.to_string(),
                            };
                            if !self.deliver(action).await {
                                break;
                            }
                        },
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => break,
                () = tokio::time::sleep(self.retry_delay) => {},
            }
        }

        debug!(%collection, "Snapshot pump stopped");
    }

    /// Forward until the stream ends (`true`) or the pump must stop (`false`)
    async fn forward(&mut self, stream: &mut SnapshotStream) -> bool {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => return false,
                next = stream.next() => {
                    let action = match next {
                        Some(Ok(snapshot)) => LedgerAction::SnapshotReceived { snapshot },
                        Some(Err(error)) => LedgerAction::SyncFailed {
                            collection: self.collection,
                            error: error.to_string(),
                        },
                        None => return true,
                    };
                    if !self.deliver(action).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Send to the store; `false` once it is shutting down
    async fn deliver(&self, action: LedgerAction) -> bool {
        match self.store.send(action).await {
            Ok(_) => true,
            Err(StoreError::ShutdownInProgress) => false,
            Err(error) => {
                warn!(collection = %self.collection, error = %error, "Could not deliver snapshot");
                true
            },
        }
    }
}
