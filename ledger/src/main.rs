//! Kitroom demo binary.
//!
//! Connects to the configured document store, waits for the first
//! snapshots and walks one booking through its whole lifecycle.

use kitroom_core::document_store::DocumentStore;
use kitroom_ledger::config::{Backend, Config};
use kitroom_ledger::types::{
    BookingRequest, CartLine, Choice, ClassName, GroupLetter, GroupMember, PlanDraft, ProjectType,
    ShootLocation,
};
use kitroom_ledger::{LedgerOptions, ReservationLedger};
use kitroom_postgres::PostgresDocumentStore;
use kitroom_testing::InMemoryDocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kitroom_ledger=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(backend = ?config.backend, "Configuration loaded");

    let documents = open_documents(&config).await?;
    let ledger = ReservationLedger::start(documents, LedgerOptions::from_config(&config)?);
    ledger.wait_until_synced(Duration::from_secs(10)).await?;
    info!(items = ledger.inventory().await.len(), "Ledger synced");

    run_demo(&ledger, &config).await?;

    ledger.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}

/// Pick the configured backend, falling back to memory if Postgres is unreachable
async fn open_documents(
    config: &Config,
) -> Result<Arc<dyn DocumentStore>, Box<dyn std::error::Error>> {
    if config.backend == Backend::Postgres {
        if let Some(url) = &config.postgres.url {
            info!("Connecting to document database...");
            match PostgresDocumentStore::connect(
                url,
                config.postgres.max_connections,
                config.connect_timeout(),
            )
            .await
            {
                Ok(store) => {
                    store.migrate().await?;
                    info!("Document database connected");
                    return Ok(Arc::new(store));
                },
                Err(error) => {
                    warn!(error = %error, "Database unreachable, using the local store");
                },
            }
        } else {
            warn!("Postgres backend selected without DATABASE_URL, using the local store");
        }
    }

    let store = match &config.local_snapshot {
        Some(path) => {
            info!(path = %path.display(), "Opening local snapshot");
            InMemoryDocumentStore::open(path).await?
        },
        None => InMemoryDocumentStore::new(),
    };
    Ok(Arc::new(store))
}

async fn run_demo(
    ledger: &ReservationLedger,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(available = ledger.available_count("cam-1", None).await, "cam-1 before booking");

    let draft = PlanDraft {
        class_name: Choice::Known(ClassName::Me25a),
        project_type: Choice::Known(ProjectType::Werbespot),
        project_topic: Some("Limonade".to_string()),
        group_letter: GroupLetter::B,
        members: vec![GroupMember {
            name: "Alex".to_string(),
            role: "Kamera".to_string(),
        }],
        locations: vec![ShootLocation {
            address: "Schulhof".to_string(),
            date: "2025-09-08".to_string(),
            time_start: "09:00".to_string(),
            time_end: "12:00".to_string(),
        }],
        contact_phone: "0151 0000000".to_string(),
        return_date: "2025-09-10".to_string(),
        storage_dates: vec![],
    };
    let request = BookingRequest {
        items: vec![
            CartLine {
                item_id: "cam-1".to_string(),
                count: 1,
            },
            CartLine {
                item_id: "tripod-1".to_string(),
                count: 1,
            },
        ],
        custom_items: vec![],
    };

    let created = ledger.create_plan(draft, request).await?;
    info!(code = %created.edit_code, booking = %created.booking_id, "Plan submitted");
    info!(available = ledger.available_count("cam-1", None).await, "cam-1 after booking");

    let loaded = ledger.load_plan_by_code(&created.edit_code).await?;
    info!(status = %loaded.booking.status, "Loaded by edit code");

    let access = ledger.unlock(&config.teacher_pin)?;
    ledger.pack(&access, &created.booking_id).await?;
    ledger
        .activate(&access, &created.booking_id, Some("signature:Alex"))
        .await?;
    let packing_list = ledger.packing_list(&access, &created.booking_id).await?;
    info!("\n{packing_list}");

    ledger.mark_all_returned(&access, &created.booking_id).await?;
    info!(available = ledger.available_count("cam-1", None).await, "cam-1 after return");

    for entry in ledger.dashboard(&access, None).await.iter().take(5) {
        info!(
            class = %entry.plan.class_name,
            group = %entry.plan.group_letter,
            status = %entry.booking.status,
            "Dashboard"
        );
    }
    Ok(())
}
