//! Booking lifecycle state machine.
//!
//! ```text
//! pending ──pack──► packed ──activate──► active ──all returned──► returned
//!    └──────────────activate──────────────┘  ▲                        │
//!                                            └────── un-mark one ─────┘
//! ```
//!
//! Every transition works on a `&mut Booking` and reports whether anything
//! changed, so the caller only writes when there is something to write. On
//! error the booking is left untouched.

use crate::error::{EntityKind, LedgerError};
use crate::types::{Booking, BookingItem, BookingStatus, CartLine};
use chrono::{DateTime, Utc};

fn ensure_handout_open(booking: &Booking) -> Result<(), LedgerError> {
    match booking.status {
        BookingStatus::Pending | BookingStatus::Packed => Ok(()),
        status => Err(LedgerError::InvalidState(format!(
            "Booking {} is {status}; hand-out is closed",
            booking.id
        ))),
    }
}

fn line_mut<'a>(booking: &'a mut Booking, item_id: &str) -> Result<&'a mut BookingItem, LedgerError> {
    booking
        .item_mut(item_id)
        .ok_or_else(|| LedgerError::not_found(EntityKind::Item, item_id))
}

/// Flip one line between nothing and everything handed out
///
/// # Errors
///
/// - [`LedgerError::InvalidState`] unless the booking is pending or packed
/// - [`LedgerError::NotFound`] if the booking has no line for `item_id`
pub fn toggle_handout(booking: &mut Booking, item_id: &str) -> Result<bool, LedgerError> {
    ensure_handout_open(booking)?;
    let line = line_mut(booking, item_id)?;
    line.handed_out_count = if line.handed_out_count > 0 {
        0
    } else {
        line.requested_count
    };
    line.returned_count = line.returned_count.min(line.handed_out_count);
    Ok(true)
}

/// Stage every line for hand-out
///
/// # Errors
///
/// [`LedgerError::InvalidState`] unless the booking is pending or packed.
pub fn pack(booking: &mut Booking) -> Result<bool, LedgerError> {
    ensure_handout_open(booking)?;
    let before = booking.clone();
    for line in &mut booking.items {
        line.handed_out_count = line.requested_count;
    }
    booking.status = BookingStatus::Packed;
    Ok(*booking != before)
}

/// Record the signature; the hand-out time is set on first capture
///
/// # Errors
///
/// - [`LedgerError::InvalidInput`] if the signature is blank
/// - [`LedgerError::InvalidState`] unless the booking is pending or packed
pub fn capture_signature(
    booking: &mut Booking,
    signature: &str,
    now: DateTime<Utc>,
) -> Result<bool, LedgerError> {
    if signature.trim().is_empty() {
        return Err(LedgerError::InvalidInput("Signature is empty".to_string()));
    }
    ensure_handout_open(booking)?;
    if booking.signature.as_deref() == Some(signature) {
        return Ok(false);
    }
    booking.signature = Some(signature.to_string());
    booking.handout_date.get_or_insert(now);
    Ok(true)
}

/// Drop the signature so the student can sign again
///
/// # Errors
///
/// [`LedgerError::InvalidState`] unless the booking is pending or packed.
pub fn clear_signature(booking: &mut Booking) -> Result<bool, LedgerError> {
    ensure_handout_open(booking)?;
    Ok(booking.signature.take().is_some())
}

/// Hand the equipment over
///
/// A signature passed here is captured first; otherwise one must already be
/// on the booking. Handed-out counts stay as toggled, so a booking with
/// nothing handed out is `returned` right away.
///
/// # Errors
///
/// - [`LedgerError::InvalidState`] unless the booking is pending or packed
/// - [`LedgerError::InvalidInput`] if there is no usable signature
pub fn activate(
    booking: &mut Booking,
    signature: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, LedgerError> {
    ensure_handout_open(booking)?;
    let mut next = booking.clone();
    if let Some(signature) = signature {
        capture_signature(&mut next, signature, now)?;
    }
    if next.signature.as_deref().is_none_or(|s| s.trim().is_empty()) {
        return Err(LedgerError::InvalidInput(
            "A signature is required to hand out equipment".to_string(),
        ));
    }
    next.handout_date.get_or_insert(now);
    next.status = BookingStatus::Active;
    recompute_status(&mut next);
    *booking = next;
    Ok(true)
}

/// Set a line's specific-unit tags and note; allowed in any state
///
/// # Errors
///
/// [`LedgerError::NotFound`] if the booking has no line for `item_id`.
pub fn annotate(
    booking: &mut Booking,
    item_id: &str,
    specific_ids: Vec<String>,
    notes: String,
) -> Result<bool, LedgerError> {
    let line = line_mut(booking, item_id)?;
    if line.specific_ids == specific_ids && line.notes == notes {
        return Ok(false);
    }
    line.specific_ids = specific_ids;
    line.notes = notes;
    Ok(true)
}

/// Flip one line between fully returned and not returned
///
/// Only issued bookings take returns; on a pending or packed booking this
/// is a no-op.
///
/// # Errors
///
/// [`LedgerError::NotFound`] if the booking has no line for `item_id`.
pub fn toggle_returned(booking: &mut Booking, item_id: &str) -> Result<bool, LedgerError> {
    let issued = booking.status.is_issued();
    let line = line_mut(booking, item_id)?;
    if !issued {
        return Ok(false);
    }

    let before = line.returned_count;
    line.returned_count = if line.handed_out_count > 0 && line.is_returned() {
        0
    } else {
        line.handed_out_count
    };
    let changed = line.returned_count != before;
    Ok(recompute_status(booking) || changed)
}

/// Mark every line fully returned
///
/// No-op unless the booking is active or returned.
pub fn mark_all_returned(booking: &mut Booking) -> bool {
    if !booking.status.is_issued() {
        return false;
    }
    let mut changed = false;
    for line in &mut booking.items {
        if line.returned_count != line.handed_out_count {
            line.returned_count = line.handed_out_count;
            changed = true;
        }
    }
    recompute_status(booking) || changed
}

/// `returned` iff every line is back, for issued bookings
///
/// Returns whether the status changed.
pub fn recompute_status(booking: &mut Booking) -> bool {
    if !booking.status.is_issued() {
        return false;
    }
    let next = if booking.items.iter().all(BookingItem::is_returned) {
        BookingStatus::Returned
    } else {
        BookingStatus::Active
    };
    let changed = booking.status != next;
    booking.status = next;
    changed
}

/// Rebuild the lines of a booking for a revised request
///
/// Surviving item ids keep their hand-out history, clamped to the new
/// requested count; dropped items vanish.
#[must_use]
pub fn reconcile_items(existing: &[BookingItem], request: &[CartLine]) -> Vec<BookingItem> {
    request
        .iter()
        .map(|wanted| match existing.iter().find(|line| line.item_id == wanted.item_id) {
            Some(line) => {
                let handed_out_count = line.handed_out_count.min(wanted.count);
                BookingItem {
                    item_id: wanted.item_id.clone(),
                    requested_count: wanted.count,
                    handed_out_count,
                    returned_count: line.returned_count.min(handed_out_count),
                    specific_ids: line.specific_ids.clone(),
                    notes: line.notes.clone(),
                }
            },
            None => BookingItem::requested(wanted.item_id.clone(), wanted.count),
        })
        .collect()
}
