//! Error types for the dispense workflow.

use kiosk_core::OperationId;
use kiosk_hardware::HardwareError;

use crate::state_machine::TerminalState;

/// Result type alias for terminal operations.
pub type Result<T> = std::result::Result<T, TerminalError>;

/// Errors surfaced by [`Terminal`](crate::Terminal) operations.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    /// A card is already staged or being resolved.
    #[error("Operation already pending")]
    OperationPending { operation_id: Option<OperationId> },

    /// There is no pending operation to confirm.
    #[error("No pending operation")]
    NoPendingOperation,

    /// The confirm request names a different operation.
    #[error("Operation id mismatch (pending {pending})")]
    OperationMismatch { pending: OperationId },

    /// Lifecycle transition rejected by the state machine.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: TerminalState,
        to: TerminalState,
    },

    /// Dispenser or identifier failure.
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Settings could not be loaded.
    #[error("Settings error: {0}")]
    Settings(#[from] kiosk_core::Error),

    /// A background or blocking task panicked or was cancelled.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

/// Coarse classification used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Another operation holds the dispenser.
    Conflict,
    /// The operation no longer exists.
    Gone,
    /// The request named the wrong operation.
    Mismatch,
    /// The request was valid but executing it failed.
    Execution,
}

impl TerminalError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TerminalError::OperationPending { .. } => ErrorKind::Conflict,
            TerminalError::NoPendingOperation => ErrorKind::Gone,
            TerminalError::OperationMismatch { .. } => ErrorKind::Mismatch,
            TerminalError::InvalidTransition { .. }
            | TerminalError::Hardware(_)
            | TerminalError::Settings(_)
            | TerminalError::TaskFailed(_) => ErrorKind::Execution,
        }
    }
}

impl From<tokio::task::JoinError> for TerminalError {
    fn from(error: tokio::task::JoinError) -> Self {
        TerminalError::TaskFailed(error.to_string())
    }
}
