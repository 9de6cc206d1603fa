//! The ledger reducer: every booking rule, as a pure function over
//! [`LedgerState`].
//!
//! Commands are validated against the current snapshot. An accepted command
//! updates local state optimistically and returns one commit effect whose
//! outcome comes back as an action; a rejected command changes nothing and
//! answers with [`LedgerAction::CommandRejected`].
//!
//! Snapshots pushed by the document store replace whole collections, except
//! for documents with an optimistic write the snapshot has not caught up
//! with yet. Those keep their local record until a snapshot shows the
//! written version (or a newer one), or until the commit that made them fails.

use crate::availability;
use crate::catalog::{catalog_order, seed_inventory, DEFAULT_CATEGORIES};
use crate::edit_code::{self, EditCodeSource};
use crate::error::{EntityKind, LedgerError};
use crate::lifecycle;
use crate::packing::PackingList;
use crate::types::{
    Booking, BookingId, BookingItem, BookingRequest, BookingStatus, CartLine, CreatedPlan, CustomItem,
    InventoryItem, PlanDraft, PlanId, PlanWithBooking, RequestId, ShootPlan, MAX_LOCATIONS,
    MAX_MEMBERS,
};
use chrono::{DateTime, Utc};
use kitroom_core::document::{Collection, CollectionSnapshot, CommitReceipt, Version, WriteBatch};
use kitroom_core::document_store::DocumentStore;
use kitroom_core::effect::Effect;
use kitroom_core::environment::Clock;
use kitroom_core::reducer::Reducer;
use kitroom_core::{commit_batch, emit, load_collection, smallvec, SmallVec};
use kitroom_macros::Action;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

type Effects = SmallVec<[Effect<LedgerAction>; 4]>;

// ============================================================================
// State
// ============================================================================

/// Local view of the three collections plus their document versions
#[derive(Clone, Debug, Default)]
pub struct LedgerState {
    /// Inventory by item id
    pub inventory: BTreeMap<String, InventoryItem>,
    /// Plans by id
    pub plans: BTreeMap<PlanId, ShootPlan>,
    /// Bookings by id
    pub bookings: BTreeMap<BookingId, Booking>,
    versions: BTreeMap<(Collection, String), Version>,
    pending: BTreeMap<DocumentKey, PendingWrite>,
    in_flight: HashMap<RequestId, Vec<(DocumentKey, PendingWrite)>>,
    synced: BTreeSet<Collection>,
    seed_requested: bool,
}

type DocumentKey = (Collection, String);

/// An optimistic write not yet reflected in a snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PendingWrite {
    /// Written; the store will assign this version
    Put(Version),
    /// Deleted at this version
    Delete(Version),
}

impl PendingWrite {
    /// Whether a snapshot holding `seen` for the document predates this write
    fn is_ahead_of(self, seen: Option<Version>) -> bool {
        match self {
            Self::Put(version) => seen.is_none_or(|seen| seen < version),
            Self::Delete(version) => seen.is_some_and(|seen| seen <= version),
        }
    }
}

impl LedgerState {
    /// Empty, not yet synced state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known version of a document; `INITIAL` if unknown
    #[must_use]
    pub fn version(&self, collection: Collection, id: &str) -> Version {
        self.versions
            .get(&(collection, id.to_string()))
            .copied()
            .unwrap_or(Version::INITIAL)
    }

    /// Whether every collection has delivered at least one snapshot
    #[must_use]
    pub fn is_synced(&self) -> bool {
        Collection::ALL.iter().all(|c| self.synced.contains(c))
    }

    /// Remaining bookable units of an item; 0 for unknown items
    #[must_use]
    pub fn available_count(&self, item_id: &str, exclude: Option<&BookingId>) -> i64 {
        availability::available_count(
            self.inventory.get(item_id).map(|item| item.total_stock),
            self.bookings.values(),
            item_id,
            exclude,
        )
    }

    /// The booking of a plan
    #[must_use]
    pub fn booking_for_plan(&self, plan_id: &PlanId) -> Option<&Booking> {
        self.bookings.values().find(|booking| &booking.plan_id == plan_id)
    }

    /// Codes of plans whose booking is still pending
    #[must_use]
    pub fn pending_edit_codes(&self) -> HashSet<&str> {
        self.plans
            .values()
            .filter(|plan| {
                self.booking_for_plan(&plan.id)
                    .is_some_and(|booking| booking.status == BookingStatus::Pending)
            })
            .filter_map(|plan| plan.edit_code.as_deref())
            .collect()
    }

    /// Plan and booking for an edit code
    ///
    /// # Errors
    ///
    /// See [`edit_code::lookup`].
    pub fn lookup_edit_code(&self, code: &str) -> Result<PlanWithBooking, LedgerError> {
        edit_code::lookup(self.plans.values(), self.bookings.values(), code)
    }

    /// Inventory in catalog order
    #[must_use]
    pub fn inventory_in_catalog_order(&self) -> Vec<InventoryItem> {
        let mut items: Vec<InventoryItem> = self.inventory.values().cloned().collect();
        items.sort_by(|a, b| catalog_order(&a.id, &b.id));
        items
    }

    /// Sorted unique categories, or the defaults while the inventory is empty
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        if self.inventory.is_empty() {
            return DEFAULT_CATEGORIES.iter().map(ToString::to_string).collect();
        }
        self.inventory
            .values()
            .map(|item| item.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Plans with their bookings, newest first, optionally for one class
    #[must_use]
    pub fn dashboard(&self, class_filter: Option<&str>) -> Vec<PlanWithBooking> {
        let mut entries: Vec<PlanWithBooking> = self
            .plans
            .values()
            .filter(|plan| class_filter.is_none_or(|class| plan.class_name == class))
            .filter_map(|plan| {
                self.booking_for_plan(&plan.id).map(|booking| PlanWithBooking {
                    plan: plan.clone(),
                    booking: booking.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| b.plan.created_at.cmp(&a.plan.created_at));
        entries
    }

    /// Packing list of a booking
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] if the booking or its plan is missing.
    pub fn packing_list(&self, booking_id: &BookingId) -> Result<PackingList, LedgerError> {
        let booking = self
            .bookings
            .get(booking_id)
            .ok_or_else(|| LedgerError::not_found(EntityKind::Booking, booking_id.as_str()))?;
        let plan = self
            .plans
            .get(&booking.plan_id)
            .ok_or_else(|| LedgerError::not_found(EntityKind::Plan, booking.plan_id.as_str()))?;
        Ok(PackingList::build(plan, booking, &self.inventory))
    }

    /// Number of optimistic writes no snapshot has confirmed yet
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Replace a whole collection; returns whether it was the first snapshot
    fn apply_snapshot(&mut self, snapshot: &CollectionSnapshot) -> bool {
        let collection = snapshot.collection;
        let seen = |id: &str| snapshot.get(id).map(|document| document.version);

        self.pending
            .retain(|(c, id), write| *c != collection || write.is_ahead_of(seen(id)));
        let held: BTreeMap<String, PendingWrite> = self
            .pending
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|((_, id), write)| (id.clone(), *write))
            .collect();
        if !held.is_empty() {
            tracing::debug!(%collection, held = held.len(), "Snapshot is behind local writes");
        }

        self.versions.retain(|(c, id), _| *c != collection || held.contains_key(id));
        for document in &snapshot.documents {
            if !held.contains_key(&document.id) {
                self.versions
                    .insert((collection, document.id.clone()), document.version);
            }
        }

        match collection {
            Collection::Inventory => merge_snapshot(
                &mut self.inventory,
                snapshot,
                &held,
                |item: &InventoryItem| item.id.clone(),
                ToString::to_string,
            ),
            Collection::ShootPlans => merge_snapshot(
                &mut self.plans,
                snapshot,
                &held,
                |plan: &ShootPlan| plan.id.clone(),
                |id: &str| PlanId::from(id),
            ),
            Collection::Bookings => merge_snapshot(
                &mut self.bookings,
                snapshot,
                &held,
                |booking: &Booking| booking.id.clone(),
                |id: &str| BookingId::from(id),
            ),
        }

        self.synced.insert(collection)
    }

    /// Take the versions a commit produced, unless a snapshot already moved past them
    fn record_receipt(&mut self, receipt: &CommitReceipt) {
        for write in &receipt.writes {
            let key = (write.collection, write.id.clone());
            match write.version {
                Some(version) => {
                    let entry = self.versions.entry(key).or_insert(version);
                    *entry = (*entry).max(version);
                },
                None => {
                    self.versions.remove(&key);
                },
            }
        }
    }

    /// Forget the writes of a failed commit, unless a later command rewrote them
    fn abandon(&mut self, request_id: &RequestId) {
        for (key, write) in self.in_flight.remove(request_id).unwrap_or_default() {
            if self.pending.get(&key) == Some(&write) {
                self.pending.remove(&key);
            }
        }
    }
}

/// Replace `local` with the decoded snapshot, keeping records with held writes
fn merge_snapshot<T, K, F, I>(
    local: &mut BTreeMap<K, T>,
    snapshot: &CollectionSnapshot,
    held: &BTreeMap<String, PendingWrite>,
    key: F,
    key_of_id: I,
) where
    T: serde::de::DeserializeOwned,
    K: Ord,
    F: Fn(&T) -> K,
    I: Fn(&str) -> K,
{
    let mut merged: BTreeMap<K, T> = snapshot
        .documents
        .iter()
        .filter(|document| !held.contains_key(&document.id))
        .filter_map(|document| match document.decode::<T>() {
            Ok(record) => Some((key(&record), record)),
            Err(error) => {
                tracing::warn!(
                    collection = %snapshot.collection,
                    id = %document.id,
                    error = %error,
                    "Skipping undecodable document"
                );
                None
            },
        })
        .collect();

    for (id, write) in held {
        let id = key_of_id(id);
        if let PendingWrite::Put(_) = write {
            if let Some(record) = local.remove(&id) {
                merged.insert(id, record);
            }
        }
    }
    *local = merged;
}

// ============================================================================
// Actions
// ============================================================================

/// Everything the ledger reducer reacts to
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum LedgerAction {
    // Commands
    /// Submit a new plan with its booking
    #[command]
    CreatePlan {
        /// Correlation id
        request_id: RequestId,
        /// Id for the new plan
        plan_id: PlanId,
        /// Id for the new booking
        booking_id: BookingId,
        /// Descriptive fields
        draft: PlanDraft,
        /// Requested equipment
        request: BookingRequest,
    },

    /// Replace a pending plan and its requested equipment
    #[command]
    UpdatePlan {
        /// Correlation id
        request_id: RequestId,
        /// Plan to revise
        plan_id: PlanId,
        /// New descriptive fields
        draft: PlanDraft,
        /// New requested equipment
        request: BookingRequest,
    },

    /// Remove a plan and every booking that references it
    #[command]
    DeletePlan {
        /// Correlation id
        request_id: RequestId,
        /// Plan to delete
        plan_id: PlanId,
    },

    /// Stage every line for hand-out
    #[command]
    PackBooking {
        /// Correlation id
        request_id: RequestId,
        /// Booking
        booking_id: BookingId,
    },

    /// Flip one line between nothing and everything handed out
    #[command]
    ToggleHandout {
        /// Correlation id
        request_id: RequestId,
        /// Booking
        booking_id: BookingId,
        /// Line
        item_id: String,
    },

    /// Tag specific units and leave a note on one line
    #[command]
    AnnotateItem {
        /// Correlation id
        request_id: RequestId,
        /// Booking
        booking_id: BookingId,
        /// Line
        item_id: String,
        /// Unit labels
        specific_ids: Vec<String>,
        /// Note
        notes: String,
    },

    /// Record the student's signature
    #[command]
    CaptureSignature {
        /// Correlation id
        request_id: RequestId,
        /// Booking
        booking_id: BookingId,
        /// Signature payload
        signature: String,
    },

    /// Drop the signature so the student can sign again
    #[command]
    ClearSignature {
        /// Correlation id
        request_id: RequestId,
        /// Booking
        booking_id: BookingId,
    },

    /// Hand the equipment over
    #[command]
    ActivateBooking {
        /// Correlation id
        request_id: RequestId,
        /// Booking
        booking_id: BookingId,
        /// Signature to capture first, if not already on the booking
        signature: Option<String>,
    },

    /// Flip one line between fully returned and not returned
    #[command]
    ToggleReturned {
        /// Correlation id
        request_id: RequestId,
        /// Booking
        booking_id: BookingId,
        /// Line
        item_id: String,
    },

    /// Mark every line fully returned
    #[command]
    MarkAllReturned {
        /// Correlation id
        request_id: RequestId,
        /// Booking
        booking_id: BookingId,
    },

    /// Add a new inventory item
    #[command]
    AddInventoryItem {
        /// Correlation id
        request_id: RequestId,
        /// The item
        item: InventoryItem,
    },

    /// Overwrite an existing inventory item
    #[command]
    UpdateInventoryItem {
        /// Correlation id
        request_id: RequestId,
        /// The item
        item: InventoryItem,
    },

    /// Overwrite only the maintenance note of an item
    #[command]
    SetMaintenanceNote {
        /// Correlation id
        request_id: RequestId,
        /// Item
        item_id: String,
        /// New note; blank clears it
        note: String,
    },

    /// Reload every collection from the store
    #[command]
    Resync,

    // Events
    /// The store pushed the full contents of a collection
    #[event]
    SnapshotReceived {
        /// The snapshot
        snapshot: CollectionSnapshot,
    },

    /// A subscription or reload failed
    #[event]
    SyncFailed {
        /// Affected collection
        collection: Collection,
        /// Description
        error: String,
    },

    // Outcomes
    /// A command's writes are durable
    #[outcome]
    Committed {
        /// Correlation id
        request_id: RequestId,
        /// New versions
        receipt: CommitReceipt,
    },

    /// A new plan and its booking are durable
    #[outcome]
    PlanCreated {
        /// Correlation id
        request_id: RequestId,
        /// What the student needs to keep
        created: CreatedPlan,
        /// New versions
        receipt: CommitReceipt,
    },

    /// The command was valid but had nothing to write
    #[outcome]
    Unchanged {
        /// Correlation id
        request_id: RequestId,
    },

    /// The command failed validation; nothing was written
    #[outcome]
    CommandRejected {
        /// Correlation id
        request_id: RequestId,
        /// Why
        error: LedgerError,
    },

    /// The store refused or failed the write
    #[outcome]
    CommitFailed {
        /// Correlation id
        request_id: RequestId,
        /// Why
        error: LedgerError,
    },

    /// The default catalog was written
    #[outcome]
    SeedCommitted {
        /// Correlation id
        request_id: RequestId,
        /// New versions
        receipt: CommitReceipt,
    },

    /// Writing the default catalog failed
    #[outcome]
    SeedFailed {
        /// Correlation id
        request_id: RequestId,
        /// Why
        error: LedgerError,
    },
}

impl LedgerAction {
    /// Correlation id of a command or its outcome
    #[must_use]
    pub const fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::CreatePlan { request_id, .. }
            | Self::UpdatePlan { request_id, .. }
            | Self::DeletePlan { request_id, .. }
            | Self::PackBooking { request_id, .. }
            | Self::ToggleHandout { request_id, .. }
            | Self::AnnotateItem { request_id, .. }
            | Self::CaptureSignature { request_id, .. }
            | Self::ClearSignature { request_id, .. }
            | Self::ActivateBooking { request_id, .. }
            | Self::ToggleReturned { request_id, .. }
            | Self::MarkAllReturned { request_id, .. }
            | Self::AddInventoryItem { request_id, .. }
            | Self::UpdateInventoryItem { request_id, .. }
            | Self::SetMaintenanceNote { request_id, .. }
            | Self::Committed { request_id, .. }
            | Self::PlanCreated { request_id, .. }
            | Self::Unchanged { request_id }
            | Self::CommandRejected { request_id, .. }
            | Self::CommitFailed { request_id, .. }
            | Self::SeedCommitted { request_id, .. }
            | Self::SeedFailed { request_id, .. } => Some(request_id),
            Self::Resync | Self::SnapshotReceived { .. } | Self::SyncFailed { .. } => None,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the ledger reducer
#[derive(Clone)]
pub struct LedgerEnvironment {
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Persistence boundary
    pub documents: Arc<dyn DocumentStore>,
    /// Edit code source
    pub edit_codes: Arc<dyn EditCodeSource>,
}

impl LedgerEnvironment {
    /// Creates a new `LedgerEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        documents: Arc<dyn DocumentStore>,
        edit_codes: Arc<dyn EditCodeSource>,
    ) -> Self {
        Self {
            clock,
            documents,
            edit_codes,
        }
    }
}

// ============================================================================
// Staged changes
// ============================================================================

/// One record-level change an accepted command makes
#[derive(Debug, Clone)]
enum Change {
    Item(InventoryItem),
    Plan(ShootPlan),
    Booking(Booking),
    RemovePlan(PlanId),
    RemoveBooking(BookingId),
}

impl Change {
    fn key(&self) -> (Collection, &str) {
        match self {
            Self::Item(item) => (Collection::Inventory, &item.id),
            Self::Plan(plan) => (Collection::ShootPlans, plan.id.as_str()),
            Self::Booking(booking) => (Collection::Bookings, booking.id.as_str()),
            Self::RemovePlan(id) => (Collection::ShootPlans, id.as_str()),
            Self::RemoveBooking(id) => (Collection::Bookings, id.as_str()),
        }
    }
}

/// Turn changes into a batch guarded by the versions in `state`
fn stage(state: &LedgerState, changes: &[Change]) -> Result<WriteBatch, LedgerError> {
    changes.iter().try_fold(WriteBatch::new(), |batch, change| {
        let (collection, id) = change.key();
        let expected = Some(state.version(collection, id));
        let batch = match change {
            Change::Item(item) => batch.put_record(collection, id, item, expected)?,
            Change::Plan(plan) => batch.put_record(collection, id, plan, expected)?,
            Change::Booking(booking) => batch.put_record(collection, id, booking, expected)?,
            Change::RemovePlan(_) | Change::RemoveBooking(_) => {
                batch.delete(collection, id, expected)
            },
        };
        Ok(batch)
    })
}

/// Apply changes locally, predicting the versions the store will assign
fn apply(state: &mut LedgerState, request_id: RequestId, changes: Vec<Change>) {
    let mut writes = Vec::with_capacity(changes.len());
    for change in changes {
        let (collection, id) = change.key();
        let key = (collection, id.to_string());
        let current = state.version(collection, id);
        let write = match &change {
            Change::RemovePlan(_) | Change::RemoveBooking(_) => {
                state.versions.remove(&key);
                PendingWrite::Delete(current)
            },
            _ => {
                state.versions.insert(key.clone(), current.next());
                PendingWrite::Put(current.next())
            },
        };
        state.pending.insert(key.clone(), write);
        writes.push((key, write));
        match change {
            Change::Item(item) => {
                state.inventory.insert(item.id.clone(), item);
            },
            Change::Plan(plan) => {
                state.plans.insert(plan.id.clone(), plan);
            },
            Change::Booking(booking) => {
                state.bookings.insert(booking.id.clone(), booking);
            },
            Change::RemovePlan(id) => {
                state.plans.remove(&id);
            },
            Change::RemoveBooking(id) => {
                state.bookings.remove(&id);
            },
        }
    }
    state.in_flight.insert(request_id, writes);
}

// ============================================================================
// Validation
// ============================================================================

/// Descriptive fields after validation
struct ValidPlan {
    class_name: String,
    project_type: String,
    project_topic: Option<String>,
    storage_dates: Vec<String>,
    lines: Vec<CartLine>,
    custom_items: Vec<CustomItem>,
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the reservation ledger
#[derive(Clone, Copy, Debug, Default)]
pub struct LedgerReducer;

impl LedgerReducer {
    /// Creates a new `LedgerReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a plan draft and its request against current stock
    fn validate_plan(
        state: &LedgerState,
        draft: &PlanDraft,
        request: &BookingRequest,
        exclude: Option<&BookingId>,
    ) -> Result<ValidPlan, LedgerError> {
        let class_name = draft
            .class_name
            .resolve()
            .ok_or_else(|| LedgerError::InvalidInput("Class is required".to_string()))?;
        let project_type = draft
            .project_type
            .resolve()
            .ok_or_else(|| LedgerError::InvalidInput("Project type is required".to_string()))?;

        if draft.members.len() > MAX_MEMBERS {
            return Err(LedgerError::InvalidInput(format!(
                "At most {MAX_MEMBERS} group members"
            )));
        }
        if draft.locations.len() > MAX_LOCATIONS {
            return Err(LedgerError::InvalidInput(format!(
                "At most {MAX_LOCATIONS} shoot locations"
            )));
        }

        let mut seen = HashSet::new();
        let mut lines = Vec::new();
        for line in request.items.iter().filter(|line| line.count > 0) {
            if !seen.insert(line.item_id.as_str()) {
                return Err(LedgerError::InvalidInput(format!(
                    "Item {} requested twice",
                    line.item_id
                )));
            }
            let item = state
                .inventory
                .get(&line.item_id)
                .ok_or_else(|| LedgerError::not_found(EntityKind::Item, &line.item_id))?;
            let available = state.available_count(&line.item_id, exclude);
            if i64::from(line.count) > available {
                return Err(LedgerError::InvalidInput(format!(
                    "Only {} of {} available, {} requested",
                    available.max(0),
                    item.name,
                    line.count
                )));
            }
            lines.push(line.clone());
        }

        let mut storage_dates: Vec<String> = Vec::new();
        for date in draft.storage_dates.iter().map(|d| d.trim()) {
            if !date.is_empty() && !storage_dates.iter().any(|d| d == date) {
                storage_dates.push(date.to_string());
            }
        }

        Ok(ValidPlan {
            class_name,
            project_type,
            project_topic: draft
                .project_topic
                .as_deref()
                .map(str::trim)
                .filter(|topic| !topic.is_empty())
                .map(ToString::to_string),
            storage_dates,
            lines,
            custom_items: request
                .custom_items
                .iter()
                .filter(|item| item.count > 0 && !item.name.trim().is_empty())
                .cloned()
                .collect(),
        })
    }

    fn plan_from(
        id: PlanId,
        edit_code: Option<String>,
        draft: &PlanDraft,
        valid: &ValidPlan,
        created_at: DateTime<Utc>,
        updated_at: Option<DateTime<Utc>>,
    ) -> ShootPlan {
        ShootPlan {
            id,
            edit_code,
            class_name: valid.class_name.clone(),
            project_type: valid.project_type.clone(),
            project_topic: valid.project_topic.clone(),
            group_letter: draft.group_letter,
            members: draft.members.clone(),
            locations: draft.locations.clone(),
            contact_phone: draft.contact_phone.trim().to_string(),
            return_date: draft.return_date.trim().to_string(),
            storage_dates: valid.storage_dates.clone(),
            created_at,
            updated_at,
        }
    }

    // ========== Outcomes ==========

    fn reject(request_id: RequestId, error: LedgerError) -> Effects {
        tracing::warn!(%request_id, error = %error, "Command rejected");
        metrics::counter!("ledger.commands", "outcome" => "rejected").increment(1);
        smallvec![emit!(LedgerAction::CommandRejected { request_id, error })]
    }

    fn unchanged(request_id: RequestId) -> Effects {
        tracing::debug!(%request_id, "Command changed nothing");
        metrics::counter!("ledger.commands", "outcome" => "unchanged").increment(1);
        smallvec![emit!(LedgerAction::Unchanged { request_id })]
    }

    fn resync(env: &LedgerEnvironment) -> Effects {
        Collection::ALL
            .into_iter()
            .map(|collection| {
                load_collection! {
                    store: env.documents,
                    collection: collection,
                    on_success: |snapshot| Some(LedgerAction::SnapshotReceived { snapshot }),
                    on_error: |error| Some(LedgerAction::SyncFailed {
                        collection,
                        error: error.to_string(),
                    })
                }
            })
            .collect()
    }

    /// Stage, apply locally and commit; reject if staging fails
    fn write(
        state: &mut LedgerState,
        env: &LedgerEnvironment,
        request_id: RequestId,
        changes: Vec<Change>,
    ) -> Effects {
        let batch = match stage(state, &changes) {
            Ok(batch) => batch,
            Err(error) => return Self::reject(request_id, error),
        };
        apply(state, request_id, changes);
        metrics::counter!("ledger.commands", "outcome" => "accepted").increment(1);

        smallvec![commit_batch! {
            store: env.documents,
            batch: batch,
            on_success: |receipt| Some(LedgerAction::Committed { request_id, receipt }),
            on_error: |error| Some(LedgerAction::CommitFailed {
                request_id,
                error: error.into(),
            })
        }]
    }

    /// Run a lifecycle transition on a copy of a booking and write it if it changed
    fn transition<F>(
        state: &mut LedgerState,
        env: &LedgerEnvironment,
        request_id: RequestId,
        booking_id: &BookingId,
        f: F,
    ) -> Effects
    where
        F: FnOnce(&mut Booking) -> Result<bool, LedgerError>,
    {
        let Some(current) = state.bookings.get(booking_id) else {
            return Self::reject(
                request_id,
                LedgerError::not_found(EntityKind::Booking, booking_id.as_str()),
            );
        };

        let mut next = current.clone();
        match f(&mut next) {
            Err(error) => Self::reject(request_id, error),
            Ok(false) => Self::unchanged(request_id),
            Ok(true) => {
                tracing::debug!(booking = %next.id, status = %next.status, "Booking updated");
                Self::write(state, env, request_id, vec![Change::Booking(next)])
            },
        }
    }

    // ========== Commands ==========

    fn create_plan(
        state: &mut LedgerState,
        env: &LedgerEnvironment,
        request_id: RequestId,
        plan_id: PlanId,
        booking_id: BookingId,
        draft: &PlanDraft,
        request: &BookingRequest,
    ) -> Effects {
        if state.plans.contains_key(&plan_id) || state.bookings.contains_key(&booking_id) {
            return Self::reject(
                request_id,
                LedgerError::InvalidState(format!("Plan {plan_id} already exists")),
            );
        }
        let valid = match Self::validate_plan(state, draft, request, None) {
            Ok(valid) => valid,
            Err(error) => return Self::reject(request_id, error),
        };

        let edit_code = env.edit_codes.issue(&state.pending_edit_codes());
        let plan = Self::plan_from(
            plan_id.clone(),
            Some(edit_code.clone()),
            draft,
            &valid,
            env.clock.now(),
            None,
        );
        let booking = Booking {
            id: booking_id.clone(),
            plan_id: plan_id.clone(),
            items: valid
                .lines
                .iter()
                .map(|line| BookingItem::requested(line.item_id.clone(), line.count))
                .collect(),
            custom_items: valid.custom_items,
            status: BookingStatus::Pending,
            signature: None,
            handout_date: None,
        };

        let changes = vec![Change::Plan(plan), Change::Booking(booking)];
        let batch = match stage(state, &changes) {
            Ok(batch) => batch,
            Err(error) => return Self::reject(request_id, error),
        };
        apply(state, request_id, changes);
        tracing::info!(plan = %plan_id, booking = %booking_id, "Plan submitted");
        metrics::counter!("ledger.commands", "outcome" => "accepted").increment(1);

        let created = CreatedPlan {
            plan_id,
            booking_id,
            edit_code,
        };
        smallvec![commit_batch! {
            store: env.documents,
            batch: batch,
            on_success: |receipt| Some(LedgerAction::PlanCreated { request_id, created, receipt }),
            on_error: |error| Some(LedgerAction::CommitFailed {
                request_id,
                error: error.into(),
            })
        }]
    }

    fn update_plan(
        state: &mut LedgerState,
        env: &LedgerEnvironment,
        request_id: RequestId,
        plan_id: &PlanId,
        draft: &PlanDraft,
        request: &BookingRequest,
    ) -> Effects {
        let Some(plan) = state.plans.get(plan_id) else {
            return Self::reject(request_id, LedgerError::not_found(EntityKind::Plan, plan_id.as_str()));
        };
        let Some(booking) = state.booking_for_plan(plan_id) else {
            return Self::reject(
                request_id,
                LedgerError::not_found(EntityKind::Booking, format!("for plan {plan_id}")),
            );
        };
        if booking.status != BookingStatus::Pending {
            return Self::reject(
                request_id,
                LedgerError::InvalidState(format!(
                    "Booking {} is {}; only pending bookings can be edited",
                    booking.id, booking.status
                )),
            );
        }
        let valid = match Self::validate_plan(state, draft, request, Some(&booking.id)) {
            Ok(valid) => valid,
            Err(error) => return Self::reject(request_id, error),
        };

        let next_plan = Self::plan_from(
            plan.id.clone(),
            plan.edit_code.clone(),
            draft,
            &valid,
            plan.created_at,
            Some(env.clock.now()),
        );
        let next_booking = Booking {
            items: lifecycle::reconcile_items(&booking.items, &valid.lines),
            custom_items: valid.custom_items,
            ..booking.clone()
        };

        tracing::info!(plan = %plan_id, "Plan revised");
        Self::write(
            state,
            env,
            request_id,
            vec![Change::Plan(next_plan), Change::Booking(next_booking)],
        )
    }

    fn delete_plan(
        state: &mut LedgerState,
        env: &LedgerEnvironment,
        request_id: RequestId,
        plan_id: &PlanId,
    ) -> Effects {
        if !state.plans.contains_key(plan_id) {
            return Self::reject(request_id, LedgerError::not_found(EntityKind::Plan, plan_id.as_str()));
        }
        let mut changes = vec![Change::RemovePlan(plan_id.clone())];
        changes.extend(
            state
                .bookings
                .values()
                .filter(|booking| &booking.plan_id == plan_id)
                .map(|booking| Change::RemoveBooking(booking.id.clone())),
        );

        tracing::info!(plan = %plan_id, bookings = changes.len() - 1, "Plan deleted");
        Self::write(state, env, request_id, changes)
    }

    fn add_inventory_item(
        state: &mut LedgerState,
        env: &LedgerEnvironment,
        request_id: RequestId,
        mut item: InventoryItem,
    ) -> Effects {
        item.id = item.id.trim().to_string();
        if item.id.is_empty() || item.name.trim().is_empty() {
            return Self::reject(
                request_id,
                LedgerError::InvalidInput("Item id and name are required".to_string()),
            );
        }
        if state.inventory.contains_key(&item.id) {
            return Self::reject(
                request_id,
                LedgerError::InvalidInput(format!("Item {} already exists", item.id)),
            );
        }
        Self::write(state, env, request_id, vec![Change::Item(item)])
    }

    fn update_inventory_item(
        state: &mut LedgerState,
        env: &LedgerEnvironment,
        request_id: RequestId,
        item: InventoryItem,
    ) -> Effects {
        match state.inventory.get(&item.id) {
            None => Self::reject(request_id, LedgerError::not_found(EntityKind::Item, &item.id)),
            Some(current) if *current == item => Self::unchanged(request_id),
            Some(_) => Self::write(state, env, request_id, vec![Change::Item(item)]),
        }
    }

    fn set_maintenance_note(
        state: &mut LedgerState,
        env: &LedgerEnvironment,
        request_id: RequestId,
        item_id: &str,
        note: &str,
    ) -> Effects {
        let Some(current) = state.inventory.get(item_id) else {
            return Self::reject(request_id, LedgerError::not_found(EntityKind::Item, item_id));
        };
        let note = note.trim();
        let item = InventoryItem {
            maintenance_notes: (!note.is_empty()).then(|| note.to_string()),
            ..current.clone()
        };
        Self::update_inventory_item(state, env, request_id, item)
    }

    // ========== Events ==========

    fn snapshot_received(
        state: &mut LedgerState,
        env: &LedgerEnvironment,
        snapshot: &CollectionSnapshot,
    ) -> Effects {
        let first = state.apply_snapshot(snapshot);
        tracing::debug!(
            collection = %snapshot.collection,
            documents = snapshot.len(),
            first,
            "Snapshot applied"
        );

        let needs_seed = first
            && snapshot.collection == Collection::Inventory
            && state.inventory.is_empty()
            && !state.seed_requested;
        if !needs_seed {
            return SmallVec::new();
        }

        state.seed_requested = true;
        let changes: Vec<Change> = seed_inventory().into_iter().map(Change::Item).collect();
        let batch = match stage(state, &changes) {
            Ok(batch) => batch,
            Err(error) => {
                tracing::error!(error = %error, "Could not stage the default catalog");
                return SmallVec::new();
            },
        };
        let request_id = RequestId::new();
        apply(state, request_id, changes);
        tracing::info!(items = batch.len(), "Inventory is empty, writing the default catalog");

        smallvec![commit_batch! {
            store: env.documents,
            batch: batch,
            on_success: |receipt| Some(LedgerAction::SeedCommitted { request_id, receipt }),
            on_error: |error| Some(LedgerAction::SeedFailed {
                request_id,
                error: error.into(),
            })
        }]
    }
}

impl Reducer for LedgerReducer {
    type State = LedgerState;
    type Action = LedgerAction;
    type Environment = LedgerEnvironment;

    #[allow(clippy::too_many_lines)] // one arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if action.is_command() {
            tracing::debug!(action = action.action_name(), "Handling command");
        }

        match action {
            // ========== Commands ==========
            LedgerAction::CreatePlan {
                request_id,
                plan_id,
                booking_id,
                draft,
                request,
            } => Self::create_plan(state, env, request_id, plan_id, booking_id, &draft, &request),

            LedgerAction::UpdatePlan {
                request_id,
                plan_id,
                draft,
                request,
            } => Self::update_plan(state, env, request_id, &plan_id, &draft, &request),

            LedgerAction::DeletePlan { request_id, plan_id } => {
                Self::delete_plan(state, env, request_id, &plan_id)
            },

            LedgerAction::PackBooking {
                request_id,
                booking_id,
            } => Self::transition(state, env, request_id, &booking_id, lifecycle::pack),

            LedgerAction::ToggleHandout {
                request_id,
                booking_id,
                item_id,
            } => Self::transition(state, env, request_id, &booking_id, |booking| {
                lifecycle::toggle_handout(booking, &item_id)
            }),

            LedgerAction::AnnotateItem {
                request_id,
                booking_id,
                item_id,
                specific_ids,
                notes,
            } => Self::transition(state, env, request_id, &booking_id, |booking| {
                lifecycle::annotate(booking, &item_id, specific_ids, notes)
            }),

            LedgerAction::CaptureSignature {
                request_id,
                booking_id,
                signature,
            } => {
                let now = env.clock.now();
                Self::transition(state, env, request_id, &booking_id, |booking| {
                    lifecycle::capture_signature(booking, &signature, now)
                })
            },

            LedgerAction::ClearSignature {
                request_id,
                booking_id,
            } => Self::transition(state, env, request_id, &booking_id, lifecycle::clear_signature),

            LedgerAction::ActivateBooking {
                request_id,
                booking_id,
                signature,
            } => {
                let now = env.clock.now();
                Self::transition(state, env, request_id, &booking_id, |booking| {
                    lifecycle::activate(booking, signature.as_deref(), now)
                })
            },

            LedgerAction::ToggleReturned {
                request_id,
                booking_id,
                item_id,
            } => Self::transition(state, env, request_id, &booking_id, |booking| {
                lifecycle::toggle_returned(booking, &item_id)
            }),

            LedgerAction::MarkAllReturned {
                request_id,
                booking_id,
            } => Self::transition(state, env, request_id, &booking_id, |booking| {
                Ok(lifecycle::mark_all_returned(booking))
            }),

            LedgerAction::AddInventoryItem { request_id, item } => {
                Self::add_inventory_item(state, env, request_id, item)
            },

            LedgerAction::UpdateInventoryItem { request_id, item } => {
                Self::update_inventory_item(state, env, request_id, item)
            },

            LedgerAction::SetMaintenanceNote {
                request_id,
                item_id,
                note,
            } => Self::set_maintenance_note(state, env, request_id, &item_id, &note),

            LedgerAction::Resync => Self::resync(env),

            // ========== Events ==========
            LedgerAction::SnapshotReceived { snapshot } => {
                Self::snapshot_received(state, env, &snapshot)
            },

            LedgerAction::SyncFailed { collection, error } => {
                tracing::error!(%collection, error = %error, "Sync failed");
                SmallVec::new()
            },

            // ========== Outcomes ==========
            LedgerAction::Committed { request_id, receipt }
            | LedgerAction::PlanCreated { request_id, receipt, .. }
            | LedgerAction::SeedCommitted { request_id, receipt } => {
                state.in_flight.remove(&request_id);
                state.record_receipt(&receipt);
                SmallVec::new()
            },

            LedgerAction::CommitFailed { request_id, error } => {
                tracing::warn!(%request_id, error = %error, "Commit failed, reloading collections");
                state.abandon(&request_id);
                Self::resync(env)
            },

            LedgerAction::SeedFailed { request_id, error } => {
                if error.is_conflict() {
                    tracing::info!("Default catalog was written by another client");
                } else {
                    tracing::error!(error = %error, "Writing the default catalog failed");
                }
                state.abandon(&request_id);
                Self::resync(env)
            },

            LedgerAction::Unchanged { .. } | LedgerAction::CommandRejected { .. } => {
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::edit_code::SequenceEditCodes;
    use crate::types::{Choice, ClassName, GroupLetter, GroupMember, ProjectType};
    use kitroom_core::document::Document;
    use kitroom_testing::{assertions, test_clock, InMemoryDocumentStore, ReducerTest};

    fn env() -> LedgerEnvironment {
        LedgerEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(InMemoryDocumentStore::new()),
            Arc::new(SequenceEditCodes::new(["CODE22", "CODE33"])),
        )
    }

    fn item(id: &str, stock: u32) -> InventoryItem {
        InventoryItem {
            id: id.to_string(),
            category: "Kamera".to_string(),
            name: id.to_string(),
            total_stock: stock,
            link: None,
            description: None,
            maintenance_notes: None,
        }
    }

    fn draft() -> PlanDraft {
        PlanDraft {
            class_name: Choice::Known(ClassName::Me25a),
            project_type: Choice::Known(ProjectType::Werbespot),
            project_topic: Some("Limo".into()),
            group_letter: GroupLetter::A,
            members: vec![],
            locations: vec![],
            contact_phone: "0151 234".into(),
            return_date: "2025-09-10".into(),
            storage_dates: vec!["2025-09-05".into(), "2025-09-05".into(), "2025-09-06".into()],
        }
    }

    fn request(lines: &[(&str, u32)]) -> BookingRequest {
        BookingRequest {
            items: lines
                .iter()
                .map(|(id, count)| CartLine { item_id: (*id).to_string(), count: *count })
                .collect(),
            custom_items: vec![],
        }
    }

    fn stocked_state() -> LedgerState {
        let mut state = LedgerState::new();
        apply(
            &mut state,
            RequestId::new(),
            vec![Change::Item(item("cam-1", 5)), Change::Item(item("cam-2", 1))],
        );
        state.pending.clear();
        state.in_flight.clear();
        state
    }

    fn state_with_booking(status: BookingStatus) -> LedgerState {
        let mut state = stocked_state();
        let plan = LedgerReducer::plan_from(
            PlanId::new("pl-A"),
            Some("CODE22".into()),
            &draft(),
            &LedgerReducer::validate_plan(&state, &draft(), &request(&[]), None).unwrap(),
            test_clock().now(),
            None,
        );
        let booking = Booking {
            id: BookingId::new("A"),
            plan_id: PlanId::new("pl-A"),
            items: vec![BookingItem::requested("cam-1", 2)],
            custom_items: vec![],
            status,
            signature: None,
            handout_date: None,
        };
        apply(&mut state, RequestId::new(), vec![Change::Plan(plan), Change::Booking(booking)]);
        state.pending.clear();
        state.in_flight.clear();
        state
    }

    fn bookings_snapshot(bookings: &[(&Booking, u64)]) -> CollectionSnapshot {
        CollectionSnapshot {
            collection: Collection::Bookings,
            documents: bookings
                .iter()
                .map(|(booking, version)| Document {
                    id: booking.id.to_string(),
                    version: Version::new(*version),
                    data: serde_json::to_value(booking).unwrap(),
                })
                .collect(),
        }
    }

    fn create(lines: &[(&str, u32)]) -> LedgerAction {
        LedgerAction::CreatePlan {
            request_id: RequestId::new(),
            plan_id: PlanId::new("pl-A"),
            booking_id: BookingId::new("A"),
            draft: draft(),
            request: request(lines),
        }
    }

    #[test]
    fn create_plan_commits_plan_and_pending_booking() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(stocked_state())
            .when_action(create(&[("cam-1", 2), ("cam-2", 0)]))
            .then_state(|state| {
                let plan = &state.plans[&PlanId::new("pl-A")];
                assert_eq!(plan.edit_code.as_deref(), Some("CODE22"));
                assert_eq!(plan.storage_dates, ["2025-09-05", "2025-09-06"]);
                let booking = &state.bookings[&BookingId::new("A")];
                assert_eq!(booking.status, BookingStatus::Pending);
                assert_eq!(booking.items, vec![BookingItem::requested("cam-1", 2)]);
                assert_eq!(state.available_count("cam-1", None), 3);
                assert_eq!(state.version(Collection::Bookings, "A"), Version::new(1));
            })
            .then_effects(|effects| {
                let batches = assertions::committed_batches(effects);
                assert_eq!(batches.len(), 1);
                assert_eq!(batches[0].len(), 2);
                assert!(batches[0]
                    .iter()
                    .all(|op| op.expected() == Some(Version::INITIAL)));
            })
            .run();
    }

    #[test]
    fn create_rejects_more_than_available() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(stocked_state())
            .when_action(create(&[("cam-2", 2)]))
            .then_state(|state| assert!(state.plans.is_empty()))
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
                assert!(assertions::committed_batches(effects).is_empty());
            })
            .run();
    }

    #[test]
    fn create_rejects_unknown_and_duplicate_items() {
        let state = stocked_state();
        assert!(matches!(
            LedgerReducer::validate_plan(&state, &draft(), &request(&[("ghost", 1)]), None),
            Err(LedgerError::NotFound { kind: EntityKind::Item, .. })
        ));
        assert!(matches!(
            LedgerReducer::validate_plan(&state, &draft(), &request(&[("cam-1", 1), ("cam-1", 1)]), None),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn create_requires_class_and_project() {
        let state = stocked_state();
        let mut missing = draft();
        missing.class_name = Choice::Custom("  ".into());
        assert!(matches!(
            LedgerReducer::validate_plan(&state, &missing, &request(&[]), None),
            Err(LedgerError::InvalidInput(_))
        ));

        let mut crowded = draft();
        crowded.members = vec![
            GroupMember { name: "x".into(), role: "y".into() };
            MAX_MEMBERS + 1
        ];
        assert!(LedgerReducer::validate_plan(&state, &crowded, &request(&[]), None).is_err());
    }

    #[test]
    fn update_checks_stock_excluding_own_booking() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(state_with_booking(BookingStatus::Pending))
            .when_action(LedgerAction::UpdatePlan {
                request_id: RequestId::new(),
                plan_id: PlanId::new("pl-A"),
                draft: draft(),
                request: request(&[("cam-1", 5)]),
            })
            .then_state(|state| {
                let booking = &state.bookings[&BookingId::new("A")];
                assert_eq!(booking.items[0].requested_count, 5);
                let plan = &state.plans[&PlanId::new("pl-A")];
                assert_eq!(plan.edit_code.as_deref(), Some("CODE22"));
                assert!(plan.updated_at.is_some());
            })
            .then_effects(assertions::assert_has_commit_effect)
            .run();
    }

    #[test]
    fn update_is_pending_only() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(state_with_booking(BookingStatus::Packed))
            .when_action(LedgerAction::UpdatePlan {
                request_id: RequestId::new(),
                plan_id: PlanId::new("pl-A"),
                draft: draft(),
                request: request(&[("cam-1", 1)]),
            })
            .then_state(|state| {
                assert_eq!(state.bookings[&BookingId::new("A")].items[0].requested_count, 2);
            })
            .then_effects(|effects| assert!(assertions::committed_batches(effects).is_empty()))
            .run();
    }

    #[test]
    fn delete_plan_cascades_with_expected_versions() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(state_with_booking(BookingStatus::Active))
            .when_action(LedgerAction::DeletePlan {
                request_id: RequestId::new(),
                plan_id: PlanId::new("pl-A"),
            })
            .then_state(|state| {
                assert!(state.plans.is_empty());
                assert!(state.bookings.is_empty());
                assert_eq!(state.version(Collection::Bookings, "A"), Version::INITIAL);
            })
            .then_effects(|effects| {
                let batches = assertions::committed_batches(effects);
                assert_eq!(batches[0].len(), 2);
                assert!(batches[0].iter().all(|op| op.expected() == Some(Version::new(1))));
            })
            .run();
    }

    #[test]
    fn no_op_transition_answers_unchanged() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(state_with_booking(BookingStatus::Pending))
            .when_action(LedgerAction::ToggleReturned {
                request_id: RequestId::new(),
                booking_id: BookingId::new("A"),
                item_id: "cam-1".into(),
            })
            .then_effects(|effects| {
                assertions::assert_has_future_effect(effects);
                assert!(assertions::committed_batches(effects).is_empty());
            })
            .run();
    }

    #[test]
    fn handout_then_activate_then_return() {
        let booking_id = BookingId::new("A");
        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(state_with_booking(BookingStatus::Pending))
            .when_action(LedgerAction::ToggleHandout {
                request_id: RequestId::new(),
                booking_id: booking_id.clone(),
                item_id: "cam-1".into(),
            })
            .when_action(LedgerAction::ActivateBooking {
                request_id: RequestId::new(),
                booking_id: booking_id.clone(),
                signature: Some("sig".into()),
            })
            .when_action(LedgerAction::MarkAllReturned {
                request_id: RequestId::new(),
                booking_id: booking_id.clone(),
            })
            .then_state(move |state| {
                let booking = &state.bookings[&booking_id];
                assert_eq!(booking.status, BookingStatus::Returned);
                assert_eq!(booking.handout_date, Some(test_clock().now()));
                assert_eq!(state.available_count("cam-1", None), 5);
                assert_eq!(state.version(Collection::Bookings, "A"), Version::new(4));
            })
            .then_effects(|effects| {
                let batches = assertions::committed_batches(effects);
                assert_eq!(batches[0].iter().next().and_then(|op| op.expected()), Some(Version::new(3)));
            })
            .run();
    }

    #[test]
    fn first_empty_inventory_snapshot_seeds_once() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(LedgerState::new())
            .when_action(LedgerAction::SnapshotReceived {
                snapshot: CollectionSnapshot::empty(Collection::Inventory),
            })
            .then_state(|state| assert_eq!(state.inventory.len(), 59))
            .then_effects(|effects| {
                let batches = assertions::committed_batches(effects);
                assert_eq!(batches.len(), 1);
                assert_eq!(batches[0].len(), 59);
            })
            .run();

        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(LedgerState::new())
            .when_action(LedgerAction::SnapshotReceived {
                snapshot: CollectionSnapshot::empty(Collection::Inventory),
            })
            .when_action(LedgerAction::SnapshotReceived {
                snapshot: CollectionSnapshot::empty(Collection::Inventory),
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn snapshot_replaces_collection_and_versions() {
        let booking = Booking {
            id: BookingId::new("B"),
            plan_id: PlanId::new("pl-B"),
            items: vec![BookingItem::requested("cam-1", 1)],
            custom_items: vec![],
            status: BookingStatus::Active,
            signature: Some("sig".into()),
            handout_date: None,
        };
        let snapshot = CollectionSnapshot {
            collection: Collection::Bookings,
            documents: vec![
                Document {
                    id: "B".into(),
                    version: Version::new(7),
                    data: serde_json::to_value(&booking).unwrap(),
                },
                Document {
                    id: "broken".into(),
                    version: Version::new(1),
                    data: serde_json::json!({ "nonsense": true }),
                },
            ],
        };

        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(state_with_booking(BookingStatus::Pending))
            .when_action(LedgerAction::SnapshotReceived { snapshot })
            .then_state(|state| {
                assert_eq!(state.bookings.len(), 1);
                assert!(state.bookings.contains_key(&BookingId::new("B")));
                assert_eq!(state.version(Collection::Bookings, "B"), Version::new(7));
                assert_eq!(state.version(Collection::Bookings, "A"), Version::INITIAL);
                assert_eq!(state.available_count("cam-1", None), 4);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn stale_snapshot_does_not_revert_local_writes() {
        let settled = state_with_booking(BookingStatus::Pending);
        let before = settled.bookings[&BookingId::new("A")].clone();
        let stale = bookings_snapshot(&[(&before, 1)]);

        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(settled)
            .when_action(LedgerAction::ToggleHandout {
                request_id: RequestId::new(),
                booking_id: BookingId::new("A"),
                item_id: "cam-1".into(),
            })
            .when_action(LedgerAction::SnapshotReceived { snapshot: stale })
            .then_state(|state| {
                let booking = &state.bookings[&BookingId::new("A")];
                assert_eq!(booking.items[0].handed_out_count, 2);
                assert_eq!(state.version(Collection::Bookings, "A"), Version::new(2));
                assert_eq!(state.pending_writes(), 1);
            })
            .run();
    }

    #[test]
    fn confirming_snapshot_settles_local_writes() {
        let mut state = state_with_booking(BookingStatus::Pending);
        let reducer = LedgerReducer::new();
        let env = env();
        let _ = reducer.reduce(
            &mut state,
            LedgerAction::PackBooking {
                request_id: RequestId::new(),
                booking_id: BookingId::new("A"),
            },
            &env,
        );
        assert_eq!(state.pending_writes(), 1);

        let packed = state.bookings[&BookingId::new("A")].clone();
        let _ = reducer.reduce(
            &mut state,
            LedgerAction::SnapshotReceived {
                snapshot: bookings_snapshot(&[(&packed, 2)]),
            },
            &env,
        );
        assert_eq!(state.pending_writes(), 0);

        // a later snapshot without the booking means someone deleted it
        let _ = reducer.reduce(
            &mut state,
            LedgerAction::SnapshotReceived {
                snapshot: CollectionSnapshot::empty(Collection::Bookings),
            },
            &env,
        );
        assert!(state.bookings.is_empty());
    }

    #[test]
    fn local_delete_survives_stale_snapshot() {
        let mut state = state_with_booking(BookingStatus::Pending);
        let booking = state.bookings[&BookingId::new("A")].clone();
        let reducer = LedgerReducer::new();
        let _ = reducer.reduce(
            &mut state,
            LedgerAction::DeletePlan {
                request_id: RequestId::new(),
                plan_id: PlanId::new("pl-A"),
            },
            &env(),
        );
        let _ = reducer.reduce(
            &mut state,
            LedgerAction::SnapshotReceived {
                snapshot: bookings_snapshot(&[(&booking, 1)]),
            },
            &env(),
        );
        assert!(state.bookings.is_empty());
    }

    #[test]
    fn commit_failure_reloads_every_collection() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(LedgerState::new())
            .when_action(LedgerAction::CommitFailed {
                request_id: RequestId::new(),
                error: LedgerError::Persistence {
                    message: "conflict".into(),
                    conflict: true,
                },
            })
            .then_effects(|effects| assert_eq!(assertions::load_count(effects), 3))
            .run();
    }

    #[test]
    fn failed_commit_keeps_other_pending_writes() {
        let mut state = state_with_booking(BookingStatus::Pending);
        let booking = state.bookings[&BookingId::new("A")].clone();
        let reducer = LedgerReducer::new();
        let env = env();
        let note = RequestId::new();
        let _ = reducer.reduce(
            &mut state,
            LedgerAction::SetMaintenanceNote {
                request_id: note,
                item_id: "cam-2".into(),
                note: "Lens cap missing".into(),
            },
            &env,
        );
        let _ = reducer.reduce(
            &mut state,
            LedgerAction::ToggleHandout {
                request_id: RequestId::new(),
                booking_id: BookingId::new("A"),
                item_id: "cam-1".into(),
            },
            &env,
        );
        assert_eq!(state.pending_writes(), 2);

        let _ = reducer.reduce(
            &mut state,
            LedgerAction::CommitFailed {
                request_id: note,
                error: LedgerError::Persistence {
                    message: "offline".into(),
                    conflict: false,
                },
            },
            &env,
        );
        assert_eq!(state.pending_writes(), 1);

        let _ = reducer.reduce(
            &mut state,
            LedgerAction::SnapshotReceived {
                snapshot: bookings_snapshot(&[(&booking, 1)]),
            },
            &env,
        );
        assert_eq!(state.bookings[&BookingId::new("A")].items[0].handed_out_count, 2);
    }

    #[test]
    fn failed_commit_leaves_a_later_rewrite_pending() {
        let mut state = state_with_booking(BookingStatus::Pending);
        let reducer = LedgerReducer::new();
        let env = env();
        let first = RequestId::new();
        for request_id in [first, RequestId::new()] {
            let _ = reducer.reduce(
                &mut state,
                LedgerAction::ToggleHandout {
                    request_id,
                    booking_id: BookingId::new("A"),
                    item_id: "cam-1".into(),
                },
                &env,
            );
        }

        let _ = reducer.reduce(
            &mut state,
            LedgerAction::CommitFailed {
                request_id: first,
                error: LedgerError::Persistence {
                    message: "conflict".into(),
                    conflict: true,
                },
            },
            &env,
        );
        assert_eq!(state.pending_writes(), 1);
        assert_eq!(state.version(Collection::Bookings, "A"), Version::new(3));
    }

    #[test]
    fn maintenance_note_overwrites_only_the_note() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(stocked_state())
            .when_action(LedgerAction::SetMaintenanceNote {
                request_id: RequestId::new(),
                item_id: "cam-2".into(),
                note: " Display cracked ".into(),
            })
            .then_state(|state| {
                let cam = &state.inventory["cam-2"];
                assert_eq!(cam.maintenance_notes.as_deref(), Some("Display cracked"));
                assert_eq!(cam.total_stock, 1);
            })
            .then_effects(assertions::assert_has_commit_effect)
            .run();
    }

    #[test]
    fn duplicate_inventory_id_is_rejected() {
        ReducerTest::new(LedgerReducer::new())
            .with_env(env())
            .given_state(stocked_state())
            .when_action(LedgerAction::AddInventoryItem {
                request_id: RequestId::new(),
                item: item("cam-1", 9),
            })
            .then_state(|state| assert_eq!(state.inventory["cam-1"].total_stock, 5))
            .then_effects(|effects| assert!(assertions::committed_batches(effects).is_empty()))
            .run();
    }

    #[test]
    fn outcomes_carry_their_request_id() {
        let request_id = RequestId::new();
        let action = LedgerAction::Unchanged { request_id };
        assert!(action.is_outcome());
        assert_eq!(action.request_id(), Some(&request_id));
        assert_eq!(LedgerAction::Resync.request_id(), None);
        assert!(LedgerAction::Resync.is_command());
    }
}
