//! Edit codes: six-character tokens that let a student reopen their own plan
//! while its booking is still pending.
//!
//! The alphabet leaves out `I`, `O`, `0` and `1` so codes survive being read
//! aloud or copied by hand. Uniqueness is best effort: a fresh code is
//! redrawn a bounded number of times if it collides with a code of another
//! pending booking in the local snapshot.

use crate::error::{EntityKind, LedgerError};
use crate::types::{Booking, BookingStatus, PlanWithBooking, ShootPlan};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Mutex;

/// Symbols a code is drawn from
pub const ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Characters per code
pub const CODE_LENGTH: usize = 6;

/// Draws before accepting a colliding code
pub const MAX_ATTEMPTS: usize = 8;

/// Draw one code from `rng`
pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect()
}

/// Trim and upper-case user input; `None` if nothing is left
#[must_use]
pub fn normalize(input: &str) -> Option<String> {
    let code = input.trim().to_uppercase();
    (!code.is_empty()).then_some(code)
}

/// Source of fresh edit codes, injected through the environment
pub trait EditCodeSource: Send + Sync {
    /// Produce one candidate code
    fn draw(&self) -> String;

    /// Produce a code not in `taken`, giving up after [`MAX_ATTEMPTS`]
    fn issue(&self, taken: &HashSet<&str>) -> String {
        let mut code = self.draw();
        for _ in 1..MAX_ATTEMPTS {
            if !taken.contains(code.as_str()) {
                break;
            }
            tracing::debug!(%code, "Edit code collision, drawing again");
            code = self.draw();
        }
        code
    }
}

/// Production source backed by the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomEditCodes;

impl EditCodeSource for RandomEditCodes {
    fn draw(&self) -> String {
        generate(&mut rand::thread_rng())
    }
}

/// Deterministic source that hands out a fixed sequence, then repeats the last
#[derive(Debug, Default)]
pub struct SequenceEditCodes {
    codes: Mutex<Vec<String>>,
}

impl SequenceEditCodes {
    /// Hand out `codes` in order
    #[must_use]
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut codes: Vec<String> = codes.into_iter().map(Into::into).collect();
        codes.reverse();
        Self {
            codes: Mutex::new(codes),
        }
    }
}

impl EditCodeSource for SequenceEditCodes {
    fn draw(&self) -> String {
        let Ok(mut codes) = self.codes.lock() else {
            return String::new();
        };
        match codes.len() {
            0 => String::new(),
            1 => codes[0].clone(),
            _ => codes.pop().unwrap_or_default(),
        }
    }
}

/// Find the plan carrying `code` together with its still-editable booking
///
/// # Errors
///
/// - [`LedgerError::InvalidInput`] for an empty code
/// - [`LedgerError::NotFound`] if no plan carries the code or the plan has no booking
/// - [`LedgerError::InvalidState`] if the booking was already processed
pub fn lookup<'a, P, B>(plans: P, bookings: B, code: &str) -> Result<PlanWithBooking, LedgerError>
where
    P: IntoIterator<Item = &'a ShootPlan>,
    B: IntoIterator<Item = &'a Booking>,
{
    let code = normalize(code)
        .ok_or_else(|| LedgerError::InvalidInput("Edit code is empty".to_string()))?;

    let candidates: Vec<&ShootPlan> = plans
        .into_iter()
        .filter(|plan| plan.edit_code.as_deref() == Some(code.as_str()))
        .collect();
    let Some(first) = candidates.first() else {
        return Err(LedgerError::not_found(EntityKind::EditCode, &code));
    };

    // Codes are only unique among pending plans; an old returned plan may share one
    let mut processed = false;
    for booking in bookings {
        let Some(plan) = candidates.iter().find(|plan| plan.id == booking.plan_id) else {
            continue;
        };
        if booking.status == BookingStatus::Pending {
            return Ok(PlanWithBooking {
                plan: ShootPlan::clone(plan),
                booking: booking.clone(),
            });
        }
        processed = true;
    }

    if processed {
        return Err(LedgerError::InvalidState(
            "This booking was already processed and can no longer be edited".to_string(),
        ));
    }
    Err(LedgerError::not_found(
        EntityKind::Booking,
        format!("for plan {}", first.id),
    ))
}
