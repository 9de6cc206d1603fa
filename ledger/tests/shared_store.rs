//! Several ledgers over one document store.

#![allow(clippy::unwrap_used)] // Test code unwraps for clear failure messages

use futures::StreamExt;
use kitroom_core::document::{Collection, CollectionSnapshot, CommitReceipt, Version, WriteBatch};
use kitroom_core::document_store::{DocumentStore, DocumentStoreError, SnapshotStream};
use kitroom_ledger::edit_code::SequenceEditCodes;
use kitroom_ledger::types::{
    BookingRequest, BookingStatus, CartLine, Choice, ClassName, GroupLetter, PlanDraft,
};
use kitroom_ledger::{LedgerOptions, ReservationLedger};
use kitroom_testing::{test_clock, InMemoryDocumentStore};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

/// Delegates to the inner store but delivers only the first snapshot, so the
/// ledger on top of it only learns about other writers through reloads.
struct FirstSnapshotOnly(Arc<InMemoryDocumentStore>);

impl DocumentStore for FirstSnapshotOnly {
    fn load(
        &self,
        collection: Collection,
    ) -> Pin<Box<dyn Future<Output = Result<CollectionSnapshot, DocumentStoreError>> + Send + '_>>
    {
        self.0.load(collection)
    }

    fn commit(
        &self,
        batch: WriteBatch,
    ) -> Pin<Box<dyn Future<Output = Result<CommitReceipt, DocumentStoreError>> + Send + '_>> {
        self.0.commit(batch)
    }

    fn subscribe(
        &self,
        collection: Collection,
    ) -> Pin<Box<dyn Future<Output = Result<SnapshotStream, DocumentStoreError>> + Send + '_>> {
        Box::pin(async move {
            let first = self.0.load(collection).await?;
            let stream = futures::stream::once(async move { Ok::<_, DocumentStoreError>(first) })
                .chain(futures::stream::pending());
            Ok(Box::pin(stream) as SnapshotStream)
        })
    }
}

fn options(code: &str) -> LedgerOptions {
    LedgerOptions::default()
        .with_clock(Arc::new(test_clock()))
        .with_edit_codes(Arc::new(SequenceEditCodes::new([code])))
}

fn draft() -> PlanDraft {
    PlanDraft {
        class_name: Choice::Known(ClassName::Me24a),
        project_type: Choice::Custom("Musikvideo".into()),
        project_topic: None,
        group_letter: GroupLetter::F,
        members: vec![],
        locations: vec![],
        contact_phone: String::new(),
        return_date: "2025-09-15".into(),
        storage_dates: vec![],
    }
}

fn two_cameras() -> BookingRequest {
    BookingRequest {
        items: vec![CartLine {
            item_id: "cam-1".into(),
            count: 2,
        }],
        custom_items: vec![],
    }
}

/// Poll a condition until it holds or the attempts run out
macro_rules! eventually {
    ($condition:expr) => {{
        let mut held = false;
        for _ in 0..200 {
            if $condition {
                held = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        held
    }};
}

#[tokio::test]
async fn seed_runs_once_for_concurrent_starts() {
    let documents = Arc::new(InMemoryDocumentStore::new());
    let first = ReservationLedger::start(documents.clone(), options("AAA222"));
    let second = ReservationLedger::start(documents.clone(), options("BBB333"));
    first.wait_until_synced(TIMEOUT).await.unwrap();
    second.wait_until_synced(TIMEOUT).await.unwrap();

    assert!(eventually!(second.inventory().await.len() == 59));
    first.shutdown(TIMEOUT).await.unwrap();
    second.shutdown(TIMEOUT).await.unwrap();

    let inventory = documents.load(Collection::Inventory).await.unwrap();
    assert_eq!(inventory.len(), 59);
    assert!(inventory.documents.iter().all(|doc| doc.version == Version::new(1)));
    assert_eq!(documents.commit_count(), 1);
}

#[tokio::test]
async fn ledgers_converge_through_snapshots() {
    let documents = Arc::new(InMemoryDocumentStore::new());
    let student = ReservationLedger::start(documents.clone(), options("AAA222"));
    student.wait_until_synced(TIMEOUT).await.unwrap();
    let desk = ReservationLedger::start(documents.clone(), options("BBB333"));
    desk.wait_until_synced(TIMEOUT).await.unwrap();
    let teacher = desk.unlock("4103").unwrap();

    let created = student.create_plan(draft(), two_cameras()).await.unwrap();
    assert!(eventually!(desk.available_count("cam-1", None).await == 3));
    let entries = desk.dashboard(&teacher, None).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].plan.project_type, "Musikvideo");

    desk.pack(&teacher, &created.booking_id).await.unwrap();
    assert!(eventually!(student.load_plan_by_code(&created.edit_code).await.is_err()));

    student.shutdown(TIMEOUT).await.unwrap();
    desk.shutdown(TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn stale_writer_gets_a_conflict_and_reloads() {
    let documents = Arc::new(InMemoryDocumentStore::new());
    let live = ReservationLedger::start(documents.clone(), options("AAA222"));
    live.wait_until_synced(TIMEOUT).await.unwrap();
    let stale = ReservationLedger::start(
        Arc::new(FirstSnapshotOnly(documents.clone())),
        options("BBB333"),
    );
    stale.wait_until_synced(TIMEOUT).await.unwrap();

    let created = live.create_plan(draft(), two_cameras()).await.unwrap();
    stale.resync().await.unwrap();
    assert!(eventually!(stale.load_plan_by_code(&created.edit_code).await.is_ok()));

    let live_teacher = live.unlock("4103").unwrap();
    let stale_teacher = stale.unlock("4103").unwrap();
    live.pack(&live_teacher, &created.booking_id).await.unwrap();

    // still thinks the booking is pending at version 1
    let error = stale
        .toggle_handout(&stale_teacher, &created.booking_id, "cam-1")
        .await
        .unwrap_err();
    assert!(error.is_conflict());

    assert!(eventually!(stale
        .packing_list(&stale_teacher, &created.booking_id)
        .await
        .is_ok_and(|list| list.status == BookingStatus::Packed)));

    // the packed booking was not overwritten
    let stored = documents.load(Collection::Bookings).await.unwrap();
    let booking = stored.get(created.booking_id.as_str()).unwrap();
    assert_eq!(booking.version, Version::new(2));
    assert_eq!(booking.data["status"], "packed");

    live.shutdown(TIMEOUT).await.unwrap();
    stale.shutdown(TIMEOUT).await.unwrap();
}
