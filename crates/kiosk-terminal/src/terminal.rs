//! The dispense workflow.
//!
//! A [`Terminal`] is the single owner of the dispenser. Handles are cheap to
//! clone and share one session:
//!
//! ```text
//! stage()                      confirm(id, allow) / timeout
//!   |                            |
//!   | lock, open ports           | claim (CAS on the completion flag)
//!   | FC2, identify              | allow: DC, later CP    deny/timeout: CP
//!   v                            v
//! Idle ─► Staging ─► AwaitingConfirmation ─► Resolving ─► Idle
//!            └──────────────► Idle (not identified, error)
//! ```
//!
//! The lock and the open ports live in a [`DeviceLease`]; whichever path
//! ends a lifecycle drops it. A [`StateReset`] guard returns the lifecycle
//! to `Idle` on the same paths. Blocking device I/O always runs inside
//! `spawn_blocking`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use kiosk_core::constants::READ_POSITION;
use kiosk_core::{CardStatus, Identification, OperationId};
use kiosk_hardware::HardwareError;
use kiosk_protocol::CommandCode;
use kiosk_rfid::CardIdentifier;
use tokio::sync::OwnedMutexGuard;
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::devices::DeviceFactory;
use crate::error::{Result, TerminalError};
use crate::lease::{DeviceLease, DeviceLock};
use crate::pending::PendingOperation;
use crate::settings::{SettingsSource, TerminalSettings};
use crate::state_machine::{StateMachine, StateTransition, TerminalState};

/// Result of a stage request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The card is identified and parked, waiting for a decision.
    Identified(StagedCard),

    /// No card was identified. The card was retracted.
    NotIdentified {
        /// Positioning attempts made.
        attempts: u32,
        /// Time since the request started.
        elapsed: Duration,
    },
}

/// A parked card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedCard {
    /// Id the confirm request must echo.
    pub operation_id: OperationId,
    /// Identity of the card.
    pub identification: Identification,
    /// How long the card waits for a decision.
    pub timeout: Duration,
    /// Time since the request started.
    pub elapsed: Duration,
    /// Positioning attempts made.
    pub attempts: u32,
}

/// What happened to a confirmed card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Dispensed to the user. A retract follows after the settle delay.
    Dispensed {
        operation_id: OperationId,
        identification: Identification,
    },

    /// Retracted into the capture bin.
    Returned {
        operation_id: OperationId,
        identification: Identification,
    },
}

impl Resolution {
    /// `"dispensed"` or `"returned"`.
    pub fn action(&self) -> &'static str {
        match self {
            Resolution::Dispensed { .. } => "dispensed",
            Resolution::Returned { .. } => "returned",
        }
    }

    /// Identity of the resolved card.
    pub fn identification(&self) -> &Identification {
        match self {
            Resolution::Dispensed { identification, .. }
            | Resolution::Returned { identification, .. } => identification,
        }
    }
}

/// Lifecycle state plus the parked operation, guarded together.
#[derive(Debug, Default)]
struct Slot {
    machine: StateMachine,
    pending: Option<Arc<PendingOperation>>,
}

struct Inner {
    settings: Arc<dyn SettingsSource>,
    devices: Arc<dyn DeviceFactory>,
    lock: DeviceLock,
    slot: Mutex<Slot>,
}

/// Handle to the card-dispensing terminal session.
///
/// # Examples
///
/// ```no_run
/// use kiosk_terminal::{FileSettings, StageOutcome, SystemDevices, Terminal};
///
/// # async fn example() -> kiosk_terminal::Result<()> {
/// let terminal = Terminal::new(FileSettings::new("/etc/kiosk"), SystemDevices);
///
/// if let StageOutcome::Identified(card) = terminal.stage().await? {
///     println!("card {}", card.identification);
///     terminal.confirm(&card.operation_id.to_string(), true).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Terminal {
    inner: Arc<Inner>,
}

impl Terminal {
    /// Create a session over `devices`, configured by `settings`.
    pub fn new(
        settings: impl SettingsSource + 'static,
        devices: impl DeviceFactory + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings: Arc::new(settings),
                devices: Arc::new(devices),
                lock: DeviceLock::default(),
                slot: Mutex::new(Slot::default()),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TerminalState {
        self.slot().machine.current_state()
    }

    /// The last `count` lifecycle transitions, oldest first.
    pub fn history(&self, count: usize) -> Vec<StateTransition> {
        self.slot().machine.last_transitions(count)
    }

    /// Id of the operation waiting for a decision, if any.
    pub fn pending_operation(&self) -> Option<OperationId> {
        self.slot()
            .pending
            .as_ref()
            .filter(|pending| !pending.is_completed())
            .map(|pending| pending.id())
    }

    /// Move a card to the read position and identify it.
    ///
    /// Runs to completion even if the caller stops waiting, so a staged
    /// card is never left without an owner.
    ///
    /// # Errors
    ///
    /// - `OperationPending` if another lifecycle is in flight
    /// - `Settings` if the settings cannot be loaded
    /// - `Hardware` if a device fails (the card is retracted on a best-effort
    ///   basis and the lock is released)
    pub async fn stage(&self) -> Result<StageOutcome> {
        let terminal = self.clone();
        tokio::spawn(async move { terminal.run_stage().await }).await?
    }

    /// Resolve the parked card: dispense it when `allow`, retract it
    /// otherwise.
    ///
    /// # Errors
    ///
    /// - `NoPendingOperation` if nothing is parked or it was already resolved
    /// - `OperationMismatch` if `operation_id` names another operation
    /// - `Hardware` if the dispenser fails
    pub async fn confirm(&self, operation_id: &str, allow: bool) -> Result<Resolution> {
        let pending = self.claim(operation_id)?;
        let terminal = self.clone();
        tokio::spawn(async move { terminal.resolve(pending, allow).await }).await?
    }

    /// Read the dispenser's card-position sensor.
    ///
    /// Waits for the device lock, so it queues behind a parked card.
    ///
    /// # Errors
    ///
    /// Returns `Hardware` for a missing ACK or a malformed status frame.
    pub async fn card_status(&self) -> Result<CardStatus> {
        let settings = self.inner.settings.load()?;
        let guard = Arc::clone(&self.inner.lock).lock_owned().await;
        let devices = Arc::clone(&self.inner.devices);

        let status = task::spawn_blocking(move || {
            let crt = devices.open_dispenser(&settings)?;
            let mut lease = DeviceLease::dispenser_only(crt, guard);
            lease.crt().query_status()
        })
        .await??;

        debug!(status = %status, "Card status");
        Ok(status)
    }

    async fn run_stage(self) -> Result<StageOutcome> {
        let started = Instant::now();
        self.begin_stage()?;
        let mut reset = StateReset::new(self.clone());

        let settings = self.inner.settings.load()?;
        let guard = Arc::clone(&self.inner.lock).lock_owned().await;
        let devices = Arc::clone(&self.inner.devices);
        let blocking_settings = settings.clone();
        let attempt =
            task::spawn_blocking(move || stage_card(devices.as_ref(), &blocking_settings, guard))
                .await??;

        match attempt {
            StageAttempt::NotIdentified { attempts } => {
                let elapsed = started.elapsed();
                info!(attempts, elapsed_ms = elapsed.as_millis() as u64, "Card not identified");
                Ok(StageOutcome::NotIdentified { attempts, elapsed })
            }
            StageAttempt::Identified {
                identification,
                lease,
                attempts,
            } => {
                let pending = Arc::new(PendingOperation::new(
                    identification.clone(),
                    &settings,
                    lease,
                ));
                if let Err(e) = self.park(&pending) {
                    self.retract_abandoned(&pending).await;
                    return Err(e);
                }
                reset.disarm();
                self.arm_timeout(&pending);

                let elapsed = started.elapsed();
                info!(
                    operation_id = %pending.id(),
                    uid = %identification,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Card staged, awaiting confirmation"
                );
                Ok(StageOutcome::Identified(StagedCard {
                    operation_id: pending.id(),
                    identification,
                    timeout: pending.timeout(),
                    elapsed,
                    attempts,
                }))
            }
        }
    }

    fn begin_stage(&self) -> Result<()> {
        let mut slot = self.slot();
        if slot.machine.current_state().is_busy() {
            let operation_id = slot.pending.as_ref().map(|pending| pending.id());
            warn!(state = %slot.machine.current_state(), ?operation_id, "Stage rejected");
            return Err(TerminalError::OperationPending { operation_id });
        }
        slot.machine.transition_to(TerminalState::Staging)?;
        Ok(())
    }

    fn park(&self, pending: &Arc<PendingOperation>) -> Result<()> {
        let mut slot = self.slot();
        slot.machine
            .transition_to(TerminalState::AwaitingConfirmation)?;
        slot.pending = Some(Arc::clone(pending));
        Ok(())
    }

    fn arm_timeout(&self, pending: &Arc<PendingOperation>) {
        let terminal = self.clone();
        let pending = Arc::clone(pending);
        let cancelled = pending.cancellation();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!(operation_id = %pending.id(), "Confirmation timeout disarmed");
                }
                _ = tokio::time::sleep(pending.timeout()) => terminal.expire(pending).await,
            }
        });
    }

    fn claim(&self, operation_id: &str) -> Result<Arc<PendingOperation>> {
        let pending = self
            .slot()
            .pending
            .as_ref()
            .filter(|pending| !pending.is_completed())
            .cloned()
            .ok_or(TerminalError::NoPendingOperation)?;

        if !pending.id().matches(operation_id) {
            warn!(pending = %pending.id(), requested = operation_id, "Operation id mismatch");
            return Err(TerminalError::OperationMismatch {
                pending: pending.id(),
            });
        }
        if !pending.try_complete() {
            return Err(TerminalError::NoPendingOperation);
        }
        pending.cancel_timeout();
        Ok(pending)
    }

    async fn resolve(self, pending: Arc<PendingOperation>, allow: bool) -> Result<Resolution> {
        let mut reset = StateReset::new(self.clone());
        self.enter_resolving();

        let operation_id = pending.id();
        let identification = pending.identification().clone();
        let mut lease = pending
            .take_lease()
            .ok_or(TerminalError::NoPendingOperation)?;

        if !allow {
            let acked = task::spawn_blocking(move || lease.retract()).await??;
            info!(
                %operation_id,
                acked,
                parked_ms = pending.parked_for().as_millis() as u64,
                "Card returned"
            );
            return Ok(Resolution::Returned {
                operation_id,
                identification,
            });
        }

        let (mut lease, dispensed) = task::spawn_blocking(move || {
            let result = lease.crt().execute_with_enq(CommandCode::Dispense);
            (lease, result)
        })
        .await?;

        let acked = match dispensed {
            Ok(acked) => acked,
            Err(e) => {
                error!(%operation_id, error = %e, "Dispense failed");
                task::spawn_blocking(move || lease.retract_best_effort()).await?;
                return Err(e.into());
            }
        };

        info!(
            %operation_id,
            uid = %identification,
            acked,
            parked_ms = pending.parked_for().as_millis() as u64,
            retract_in_ms = pending.retract_delay().as_millis() as u64,
            "Card dispensed"
        );
        reset.disarm();
        self.schedule_retract(lease, operation_id, pending.retract_delay());

        Ok(Resolution::Dispensed {
            operation_id,
            identification,
        })
    }

    /// Timeout path. Loses quietly to a confirm that claimed first.
    async fn expire(self, pending: Arc<PendingOperation>) {
        if !pending.try_complete() {
            debug!(operation_id = %pending.id(), "Operation already resolved");
            return;
        }

        let operation_id = pending.id();
        warn!(
            %operation_id,
            staged_at = %pending.created_at(),
            "Confirmation timed out, retracting card"
        );
        let _reset = StateReset::new(self.clone());
        self.enter_resolving();

        let Some(mut lease) = pending.take_lease() else {
            return;
        };
        match task::spawn_blocking(move || lease.retract()).await {
            Ok(Ok(acked)) => info!(%operation_id, acked, "Card returned after timeout"),
            Ok(Err(e)) => error!(%operation_id, error = %e, "Timeout retract failed"),
            Err(e) => error!(%operation_id, error = %e, "Timeout retract task failed"),
        }
    }

    /// Retract the card some time after a dispense, then end the lifecycle.
    fn schedule_retract(&self, mut lease: DeviceLease, operation_id: OperationId, delay: Duration) {
        let terminal = self.clone();

        tokio::spawn(async move {
            let _reset = StateReset::new(terminal);
            tokio::time::sleep(delay).await;

            match task::spawn_blocking(move || lease.retract()).await {
                Ok(Ok(true)) => info!(%operation_id, "Post-dispense retract done"),
                Ok(Ok(false)) => warn!(%operation_id, "Post-dispense retract not acknowledged"),
                Ok(Err(e)) => error!(%operation_id, error = %e, "Post-dispense retract failed"),
                Err(e) => error!(%operation_id, error = %e, "Post-dispense retract task failed"),
            }
        });
    }

    async fn retract_abandoned(&self, pending: &PendingOperation) {
        if let Some(mut lease) = pending.take_lease() {
            if let Err(e) = task::spawn_blocking(move || lease.retract_best_effort()).await {
                error!(error = %e, "Cleanup retract task failed");
            }
        }
    }

    fn enter_resolving(&self) {
        if let Err(e) = self.slot().machine.transition_to(TerminalState::Resolving) {
            warn!(error = %e, "Unexpected lifecycle state while resolving");
        }
    }

    /// Back to `Idle`, forgetting the parked operation.
    fn finish(&self) {
        let mut slot = self.slot();
        slot.pending = None;
        if let Some(transition) = slot.machine.reset() {
            debug!(from = %transition.from, "Terminal idle");
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("state", &self.state())
            .field("pending", &self.pending_operation())
            .finish()
    }
}

/// Returns the lifecycle to `Idle` when dropped, unless disarmed.
struct StateReset {
    terminal: Terminal,
    armed: bool,
}

impl StateReset {
    fn new(terminal: Terminal) -> Self {
        Self {
            terminal,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StateReset {
    fn drop(&mut self) {
        if self.armed {
            self.terminal.finish();
        }
    }
}

enum StageAttempt {
    Identified {
        identification: Identification,
        lease: DeviceLease,
        attempts: u32,
    },
    NotIdentified {
        attempts: u32,
    },
}

/// Blocking part of a stage: open, position, identify, retract on failure.
fn stage_card(
    devices: &dyn DeviceFactory,
    settings: &TerminalSettings,
    guard: OwnedMutexGuard<()>,
) -> kiosk_hardware::Result<StageAttempt> {
    let crt = devices.open_dispenser(settings)?;
    let identifier = devices.open_identifier(settings)?;
    let mut lease = DeviceLease::new(crt, identifier, guard);

    for attempt in 1..=settings.stage_attempts {
        match identify_once(&mut lease, settings.rfid_read_timeout) {
            Ok(Some(identification)) => {
                return Ok(StageAttempt::Identified {
                    identification,
                    lease,
                    attempts: attempt,
                });
            }
            Ok(None) => {
                warn!(attempt, of = settings.stage_attempts, "No card identified, retracting");
                lease.retract()?;
            }
            Err(e) => {
                error!(attempt, error = %e, "Stage failed, retracting");
                lease.retract_best_effort();
                return Err(e);
            }
        }
    }

    Ok(StageAttempt::NotIdentified {
        attempts: settings.stage_attempts,
    })
}

fn identify_once(
    lease: &mut DeviceLease,
    window: Duration,
) -> kiosk_hardware::Result<Option<Identification>> {
    if let Some(identifier) = lease.identifier() {
        identifier.prepare()?;
    }

    if !lease.crt().execute_position(READ_POSITION)? {
        warn!("Position command not acknowledged, trying to identify anyway");
    }

    let identifier = lease
        .identifier()
        .ok_or_else(|| HardwareError::configuration("no card identifier opened"))?;
    identifier.identify(window)
}
