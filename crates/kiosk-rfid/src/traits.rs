//! Card identifier trait.
//!
//! An identifier answers one question: which card is sitting in the
//! dispenser's read position right now? Implementations differ in how they
//! listen (a serial sensor that streams a token, a PC/SC reader that is
//! polled for the UID), but the dispenser workflow treats them alike.

use kiosk_core::Identification;
use kiosk_hardware::Result;
use std::time::Duration;

/// Identifies the staged card within a bounded window.
///
/// Methods block; async callers run them inside `spawn_blocking`.
pub trait CardIdentifier: Send {
    /// Name of the source (port or reader), used in logs.
    fn name(&self) -> &str;

    /// Forget stale input before the card is moved into the read position.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying device fails.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Identify the card, giving up after `window`.
    ///
    /// `Ok(None)` means nothing usable was read. That is a normal outcome,
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only for device failures.
    fn identify(&mut self, window: Duration) -> Result<Option<Identification>>;
}
