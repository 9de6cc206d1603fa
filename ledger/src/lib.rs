//! Kitroom reservation ledger
//!
//! Students plan a video shoot and reserve equipment from the school's shared
//! pool; a teacher hands that equipment out and takes it back. This crate is
//! the single place where those bookings are validated and persisted.
//!
//! # Architecture
//!
//! ```text
//!  caller ──► ReservationLedger ──send_and_wait_for──► Store<LedgerReducer>
//!                   ▲                                        │
//!                   │ SnapshotReceived                       │ Effect::DocumentStore
//!                   │                                        ▼
//!            snapshot pumps ◄──── subscribe(collection) ── DocumentStore
//!                                                      (Postgres | in-memory)
//! ```
//!
//! - [`reducer`]: every rule lives here, as a pure function over [`reducer::LedgerState`]
//! - [`availability`]: how many units of an item are still bookable
//! - [`lifecycle`]: the `pending → packed → active → returned` state machine
//! - [`edit_code`]: self-service codes that let students revise a pending booking
//! - [`service`]: the [`ReservationLedger`] handle callers hold
//!
//! Availability is recomputed from the current snapshot on every read; it is
//! never cached.

#![forbid(unsafe_code)]

pub mod access;
pub mod availability;
pub mod catalog;
pub mod config;
pub mod edit_code;
pub mod error;
pub mod lifecycle;
pub mod packing;
pub mod reducer;
pub mod service;
pub mod types;

pub use access::{TeacherAccess, TeacherPin};
pub use availability::{available_count, Cart, CartChange};
pub use config::Config;
pub use error::{EntityKind, LedgerError};
pub use reducer::{LedgerAction, LedgerEnvironment, LedgerReducer, LedgerState};
pub use service::{LedgerOptions, ReservationLedger};
