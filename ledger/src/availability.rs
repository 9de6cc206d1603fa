//! Availability calculation and the cart quantity editor.
//!
//! ```text
//! available(item) = totalStock - Σ max(0, requested - returned)
//!                   over bookings in {pending, packed, active}, minus the excluded one
//! ```
//!
//! The result is signed and never clamped: a negative value means the item is
//! over-committed. Counting is date-insensitive and tracks reservations, not
//! physical possession.

use crate::types::{Booking, BookingId, CartLine};
use serde::{Deserialize, Serialize};

/// Units of `item_id` held by bookings that still reserve stock
pub fn reserved_count<'a, I>(bookings: I, item_id: &str, exclude: Option<&BookingId>) -> u64
where
    I: IntoIterator<Item = &'a Booking>,
{
    bookings
        .into_iter()
        .filter(|booking| booking.status.reserves_stock())
        .filter(|booking| exclude != Some(&booking.id))
        .filter_map(|booking| booking.item(item_id))
        .map(|line| u64::from(line.outstanding()))
        .sum()
}

/// Remaining bookable units of an item
///
/// `total_stock` is `None` for an unknown item, which yields 0.
///
/// # Examples
///
/// ```
/// use kitroom_ledger::availability::available_count;
/// use kitroom_ledger::types::Booking;
///
/// let bookings: Vec<Booking> = Vec::new();
/// assert_eq!(available_count(None, &bookings, "ghost", None), 0);
/// assert_eq!(available_count(Some(5), &bookings, "cam-1", None), 5);
/// ```
#[must_use]
pub fn available_count<'a, I>(
    total_stock: Option<u32>,
    bookings: I,
    item_id: &str,
    exclude: Option<&BookingId>,
) -> i64
where
    I: IntoIterator<Item = &'a Booking>,
{
    let Some(total) = total_stock else {
        return 0;
    };
    let reserved = i64::try_from(reserved_count(bookings, item_id, exclude)).unwrap_or(i64::MAX);
    i64::from(total).saturating_sub(reserved)
}

/// Result of a cart adjustment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CartChange {
    /// The line now holds this many units
    Set(u32),
    /// The line reached zero and was removed
    Removed,
    /// Nothing changed
    Unchanged,
}

/// Quantities a student is about to request
///
/// Increments beyond what is available are silently ignored; the cart never
/// holds a zero line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    /// Empty cart
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Cart prefilled with existing lines, zero counts dropped
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        Self {
            lines: lines.into_iter().filter(|line| line.count > 0).collect(),
        }
    }

    /// Units of `item_id` in the cart
    #[must_use]
    pub fn quantity(&self, item_id: &str) -> u32 {
        self.lines
            .iter()
            .find(|line| line.item_id == item_id)
            .map_or(0, |line| line.count)
    }

    /// Change the quantity of `item_id` by `delta`
    ///
    /// `available` is what the calculator reports for the item; when editing
    /// an existing booking it must be computed excluding that booking.
    pub fn adjust(&mut self, item_id: &str, delta: i64, available: i64) -> CartChange {
        let current = i64::from(self.quantity(item_id));
        let next = current.saturating_add(delta).max(0);

        if next == current {
            return CartChange::Unchanged;
        }
        if delta > 0 && next > available {
            return CartChange::Unchanged;
        }

        if next == 0 {
            self.lines.retain(|line| line.item_id != item_id);
            return CartChange::Removed;
        }

        let count = u32::try_from(next).unwrap_or(u32::MAX);
        match self.lines.iter_mut().find(|line| line.item_id == item_id) {
            Some(line) => line.count = count,
            None => self.lines.push(CartLine {
                item_id: item_id.to_string(),
                count,
            }),
        }
        CartChange::Set(count)
    }

    /// Lines in insertion order
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// True if nothing is requested
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Hand the lines over to a booking request
    #[must_use]
    pub fn into_lines(self) -> Vec<CartLine> {
        self.lines
    }
}
