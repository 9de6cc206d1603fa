//! Teacher PIN gate.
//!
//! Teacher operations take a [`TeacherAccess`] reference. The only way to
//! obtain one is [`TeacherPin::unlock`] with the right PIN.

use crate::error::LedgerError;
use std::fmt;

/// Default PIN of the equipment room
pub const DEFAULT_PIN: &str = "4103";

/// The configured teacher PIN
#[derive(Clone, PartialEq, Eq)]
pub struct TeacherPin(String);

impl TeacherPin {
    /// Accept a PIN of exactly four digits
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidInput`] for anything else.
    pub fn new(pin: &str) -> Result<Self, LedgerError> {
        let pin = pin.trim();
        if pin.len() != 4 || !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LedgerError::InvalidInput(
                "Teacher PIN must be four digits".to_string(),
            ));
        }
        Ok(Self(pin.to_string()))
    }

    /// Trade the entered PIN for teacher access
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidInput`] if the PIN does not match.
    pub fn unlock(&self, input: &str) -> Result<TeacherAccess, LedgerError> {
        if input.trim() == self.0 {
            tracing::info!("Teacher area unlocked");
            Ok(TeacherAccess { _sealed: () })
        } else {
            tracing::warn!("Wrong teacher PIN entered");
            Err(LedgerError::InvalidInput("Wrong PIN".to_string()))
        }
    }
}

impl Default for TeacherPin {
    fn default() -> Self {
        Self(DEFAULT_PIN.to_string())
    }
}

impl fmt::Debug for TeacherPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TeacherPin(****)")
    }
}

/// Proof that the teacher PIN was entered
#[derive(Debug, Clone)]
pub struct TeacherAccess {
    _sealed: (),
}
