//! Dispense lifecycle state machine.
//!
//! The terminal moves through four states per card:
//!
//! - `Idle`: No card staged, the dispenser is free
//! - `Staging`: A card is being positioned and identified
//! - `AwaitingConfirmation`: The identified card is parked in the read
//!   position until a confirm/deny decision or the timeout
//! - `Resolving`: The card is being dispensed or retracted
//!
//! # Valid Transitions
//!
//! - Idle → Staging → AwaitingConfirmation → Resolving → Idle
//! - Staging → Idle (identification failed or a transport error)
//!
//! # Examples
//!
//! ```
//! use kiosk_terminal::{StateMachine, TerminalState};
//!
//! let mut machine = StateMachine::new();
//! assert_eq!(machine.current_state(), TerminalState::Idle);
//!
//! machine.transition_to(TerminalState::Staging).unwrap();
//! assert!(machine.transition_to(TerminalState::Resolving).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use kiosk_core::constants::MAX_HISTORY_SIZE;

use crate::error::{Result, TerminalError};

/// Lifecycle state of the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// No card staged.
    Idle,

    /// A card is being positioned and identified.
    Staging,

    /// An identified card waits for confirm/deny.
    AwaitingConfirmation,

    /// The card is being dispensed or retracted.
    Resolving,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            TerminalState::Idle => "Idle",
            TerminalState::Staging => "Staging",
            TerminalState::AwaitingConfirmation => "AwaitingConfirmation",
            TerminalState::Resolving => "Resolving",
        };
        write!(f, "{}", state_str)
    }
}

impl TerminalState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiosk_terminal::TerminalState;
    ///
    /// assert!(TerminalState::Idle.can_transition_to(&TerminalState::Staging));
    /// assert!(!TerminalState::Idle.can_transition_to(&TerminalState::Resolving));
    /// ```
    pub fn can_transition_to(&self, target: &TerminalState) -> bool {
        matches!(
            (self, target),
            // From Idle
            (TerminalState::Idle, TerminalState::Staging)
            // From Staging
            | (TerminalState::Staging, TerminalState::Idle | TerminalState::AwaitingConfirmation)
            // From AwaitingConfirmation
            | (TerminalState::AwaitingConfirmation, TerminalState::Resolving)
            // From Resolving
            | (TerminalState::Resolving, TerminalState::Idle)
        )
    }

    /// Whether the dispenser is held by a lifecycle in this state.
    pub fn is_busy(&self) -> bool {
        !matches!(self, TerminalState::Idle)
    }
}

/// A single state transition with timestamp.
///
/// The `timestamp` field is not serialized as `Instant` is process-specific.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// The state transitioned from.
    pub from: TerminalState,

    /// The state transitioned to.
    pub to: TerminalState,

    /// When the transition occurred.
    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    /// Create a new state transition record stamped now.
    pub fn new(from: TerminalState, to: TerminalState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    /// Time since this transition occurred.
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// State machine for the dispense lifecycle.
///
/// Enforces valid transitions and keeps a bounded transition history.
///
/// # Thread Safety
///
/// Not synchronised. The terminal keeps it behind a mutex together with the
/// pending operation.
#[derive(Debug)]
pub struct StateMachine {
    /// Current lifecycle state.
    current_state: TerminalState,

    /// When the current state was entered.
    state_entered_at: Instant,

    /// Recent transitions (limited to `MAX_HISTORY_SIZE`).
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self {
            current_state: TerminalState::Idle,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    /// Current lifecycle state.
    pub fn current_state(&self) -> TerminalState {
        self.current_state
    }

    /// Time spent in the current state.
    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// The last `count` transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        self.history
            .iter()
            .rev()
            .take(count)
            .rev()
            .cloned()
            .collect()
    }

    /// Transition to a new state, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns `TerminalError::InvalidTransition` if the transition is not
    /// allowed from the current state. The machine is left unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiosk_terminal::{StateMachine, TerminalState};
    ///
    /// let mut machine = StateMachine::new();
    /// let transition = machine.transition_to(TerminalState::Staging).unwrap();
    /// assert_eq!(transition.from, TerminalState::Idle);
    /// assert_eq!(transition.to, TerminalState::Staging);
    /// ```
    pub fn transition_to(&mut self, new_state: TerminalState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(TerminalError::InvalidTransition {
                from: self.current_state,
                to: new_state,
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.perform_state_change(new_state, transition.clone());
        Ok(transition)
    }

    /// Return to Idle from any state.
    ///
    /// Records the transition unless the machine is already idle. Returns the
    /// transition if one happened.
    pub fn reset(&mut self) -> Option<StateTransition> {
        if self.current_state == TerminalState::Idle {
            return None;
        }

        let transition = StateTransition::new(self.current_state, TerminalState::Idle);
        self.perform_state_change(TerminalState::Idle, transition.clone());
        Some(transition)
    }

    fn perform_state_change(&mut self, new_state: TerminalState, transition: StateTransition) {
        self.current_state = new_state;
        self.state_entered_at = Instant::now();
        self.add_to_history(transition);
    }

    fn add_to_history(&mut self, transition: StateTransition) {
        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(transition);
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
