//! Exclusive use of the dispenser.
//!
//! A [`DeviceLease`] bundles the device lock guard with the ports opened
//! under it. Dropping the lease closes the ports first and then releases
//! the lock, on every path out of a lifecycle.

use std::sync::Arc;

use kiosk_hardware::CrtDriver;
use kiosk_protocol::CommandCode;
use kiosk_rfid::AnyIdentifier;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Single-slot lock serialising lifecycles and status queries.
pub type DeviceLock = Arc<Mutex<()>>;

/// Open devices plus the lock they were opened under.
#[derive(Debug)]
pub struct DeviceLease {
    // Field order is drop order: ports close before the guard is released.
    crt: CrtDriver,
    identifier: Option<AnyIdentifier>,
    _guard: OwnedMutexGuard<()>,
}

impl DeviceLease {
    /// Lease holding the dispenser and an identifier.
    pub fn new(crt: CrtDriver, identifier: AnyIdentifier, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            crt,
            identifier: Some(identifier),
            _guard: guard,
        }
    }

    /// Lease holding only the dispenser.
    pub fn dispenser_only(crt: CrtDriver, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            crt,
            identifier: None,
            _guard: guard,
        }
    }

    /// The dispenser.
    pub fn crt(&mut self) -> &mut CrtDriver {
        &mut self.crt
    }

    /// The identifier, if this lease opened one.
    pub fn identifier(&mut self) -> Option<&mut AnyIdentifier> {
        self.identifier.as_mut()
    }

    /// Retract the card into the capture bin.
    ///
    /// # Errors
    ///
    /// Returns an error if the port fails. A missing ACK is `Ok(false)`.
    pub fn retract(&mut self) -> kiosk_hardware::Result<bool> {
        self.crt.execute_with_enq(CommandCode::Retract)
    }

    /// Retract the card, logging instead of failing.
    ///
    /// Used on cleanup paths where the original error is what the caller
    /// needs to see.
    pub fn retract_best_effort(&mut self) {
        match self.crt.execute_with_enq(CommandCode::Retract) {
            Ok(true) => debug!(port = %self.crt.port(), "Cleanup retract acknowledged"),
            Ok(false) => warn!(port = %self.crt.port(), "Cleanup retract not acknowledged"),
            Err(e) => warn!(port = %self.crt.port(), error = %e, "Cleanup retract failed"),
        }
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        debug!(port = %self.crt.port(), "Releasing devices");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{DeviceFactory, MockDevices};
    use crate::settings::TerminalSettings;

    #[tokio::test]
    async fn test_drop_closes_ports_and_releases_lock() {
        let devices = MockDevices::new();
        let settings = TerminalSettings::default();
        let lock: DeviceLock = Arc::new(Mutex::new(()));

        let guard = lock.clone().lock_owned().await;
        let lease = DeviceLease::new(
            devices.open_dispenser(&settings).unwrap(),
            devices.open_identifier(&settings).unwrap(),
            guard,
        );
        assert!(lock.try_lock().is_err());
        assert!(devices.any_open());

        drop(lease);
        assert!(lock.try_lock().is_ok());
        assert!(!devices.any_open());
    }

    #[tokio::test]
    async fn test_best_effort_retract_swallows_errors() {
        let devices = MockDevices::new();
        let lock: DeviceLock = Arc::new(Mutex::new(()));
        let mut lease = DeviceLease::dispenser_only(
            devices.open_dispenser(&TerminalSettings::default()).unwrap(),
            lock.clone().lock_owned().await,
        );

        devices.crt().fail_writes(true);
        lease.retract_best_effort();
        devices.crt().fail_writes(false);
        lease.retract_best_effort();

        assert_eq!(devices.crt().count(CommandCode::Retract), 1);
        assert!(lease.identifier().is_none());
    }
}
