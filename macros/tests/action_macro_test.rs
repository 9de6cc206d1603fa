//! Tests for #[derive(Action)] macro

use chrono::{DateTime, Utc};
use kitroom_macros::Action;

#[derive(Action, Clone, Debug, PartialEq)]
enum BookingAction {
    #[command]
    TogglePacked { item_id: String },

    #[command]
    MarkAllReturned,

    #[event]
    SnapshotReceived { documents: usize, at: DateTime<Utc> },

    #[outcome]
    Committed(u64),

    #[outcome]
    Rejected { reason: String },

    Resync,
}

#[test]
fn classifies_commands() {
    let action = BookingAction::TogglePacked {
        item_id: "cam-1".to_string(),
    };
    assert!(action.is_command());
    assert!(!action.is_event());
    assert!(!action.is_outcome());
    assert!(BookingAction::MarkAllReturned.is_command());
}

#[test]
fn classifies_events() {
    let action = BookingAction::SnapshotReceived {
        documents: 3,
        at: Utc::now(),
    };
    assert!(action.is_event());
    assert!(!action.is_command());
}

#[test]
fn classifies_outcomes_of_every_shape() {
    assert!(BookingAction::Committed(4).is_outcome());
    assert!(
        BookingAction::Rejected {
            reason: "stock".to_string()
        }
        .is_outcome()
    );
}

#[test]
fn unmarked_variants_are_nothing() {
    let action = BookingAction::Resync;
    assert!(!action.is_command());
    assert!(!action.is_event());
    assert!(!action.is_outcome());
}

#[test]
fn action_name_is_variant_name() {
    assert_eq!(BookingAction::MarkAllReturned.action_name(), "MarkAllReturned");
    assert_eq!(BookingAction::Committed(1).action_name(), "Committed");
    assert_eq!(
        BookingAction::TogglePacked {
            item_id: "x".into()
        }
        .action_name(),
        "TogglePacked"
    );
}

#[test]
fn helpers_are_const() {
    const ACTION: BookingAction = BookingAction::Resync;
    const NAME: &str = ACTION.action_name();
    assert_eq!(NAME, "Resync");
}
