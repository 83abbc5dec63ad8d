//! The staged card waiting for a decision.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use kiosk_core::{Identification, OperationId};
use tokio_util::sync::CancellationToken;

use crate::lease::DeviceLease;
use crate::settings::TerminalSettings;

/// A card parked in the read position until confirmed, denied or timed out.
///
/// Whoever wins [`try_complete`](Self::try_complete) resolves the operation
/// and takes the lease; everyone else sees it as already completed.
#[derive(Debug)]
pub struct PendingOperation {
    id: OperationId,
    identification: Identification,
    created_at: DateTime<Utc>,
    timeout: Duration,
    retract_delay: Duration,
    completed: AtomicBool,
    cancel: CancellationToken,
    lease: Mutex<Option<DeviceLease>>,
}

impl PendingOperation {
    /// Park a card under a fresh operation id, with the confirmation
    /// timeout and post-dispense delay taken from `settings`.
    pub fn new(
        identification: Identification,
        settings: &TerminalSettings,
        lease: DeviceLease,
    ) -> Self {
        Self {
            id: OperationId::new(),
            identification,
            created_at: Utc::now(),
            timeout: settings.confirm_timeout,
            retract_delay: settings.dispense_retract_delay,
            completed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            lease: Mutex::new(Some(lease)),
        }
    }

    /// Operation id handed to the caller.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Identity of the parked card.
    pub fn identification(&self) -> &Identification {
        &self.identification
    }

    /// When the card was parked.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// How long the card has been parked.
    pub fn parked_for(&self) -> Duration {
        (Utc::now() - self.created_at).to_std().unwrap_or_default()
    }

    /// Confirmation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay between a dispense and the safety retract.
    pub fn retract_delay(&self) -> Duration {
        self.retract_delay
    }

    /// Whether a resolver has claimed the operation.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Claim the right to resolve. Returns `true` exactly once.
    pub fn try_complete(&self) -> bool {
        self.completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Token the timeout task waits on.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the timeout task. Idempotent.
    pub fn cancel_timeout(&self) {
        self.cancel.cancel();
    }

    /// Take the lease. Only the resolver gets `Some`.
    pub fn take_lease(&self) -> Option<DeviceLease> {
        self.lease_slot().take()
    }

    fn lease_slot(&self) -> MutexGuard<'_, Option<DeviceLease>> {
        self.lease.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{DeviceFactory, MockDevices};
    use std::sync::Arc;

    async fn pending() -> (PendingOperation, Arc<tokio::sync::Mutex<()>>) {
        let devices = MockDevices::new();
        let settings = TerminalSettings::default();
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        let lease = DeviceLease::new(
            devices.open_dispenser(&settings).unwrap(),
            devices.open_identifier(&settings).unwrap(),
            lock.clone().lock_owned().await,
        );
        let operation = PendingOperation::new(Identification::token("045678"), &settings, lease);
        assert_eq!(operation.timeout(), Duration::from_secs(30));
        assert_eq!(operation.retract_delay(), Duration::from_secs(15));
        (operation, lock)
    }

    #[tokio::test]
    async fn test_claim_is_won_once() {
        let (operation, _lock) = pending().await;
        assert!(!operation.is_completed());
        assert!(operation.try_complete());
        assert!(!operation.try_complete());
        assert!(operation.is_completed());
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let (operation, _lock) = pending().await;
        let operation = Arc::new(operation);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let operation = Arc::clone(&operation);
                tokio::spawn(async move { operation.try_complete() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_lease_taken_once_and_released() {
        let (operation, lock) = pending().await;
        assert!(lock.try_lock().is_err());

        let lease = operation.take_lease();
        assert!(lease.is_some());
        assert!(operation.take_lease().is_none());

        drop(lease);
        assert!(lock.try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_parked_for_counts_from_creation() {
        let before = Utc::now();
        let (operation, _lock) = pending().await;
        assert!(operation.created_at() >= before);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(operation.parked_for() >= Duration::from_millis(20));
        assert!(operation.parked_for() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_timeout_is_idempotent() {
        let (operation, _lock) = pending().await;
        let token = operation.cancellation();
        operation.cancel_timeout();
        operation.cancel_timeout();
        assert!(token.is_cancelled());
    }
}
