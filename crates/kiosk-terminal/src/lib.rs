//! Dispense workflow of the card-dispensing terminal.
//!
//! This crate owns the dispenser session: the lifecycle state machine, the
//! device lock, the parked operation and its confirmation timeout, and the
//! settings that are reloaded for every request.
//!
//! # Lifecycle
//!
//! 1. [`Terminal::stage`] positions a card, identifies it and parks it
//! 2. [`Terminal::confirm`] dispenses (allow) or retracts (deny) it
//! 3. Without a decision the card is retracted when the timeout fires
//!
//! [`Terminal::card_status`] reads the hopper sensor between lifecycles.

pub mod devices;
pub mod error;
pub mod lease;
pub mod pending;
pub mod settings;
pub mod state_machine;
pub mod terminal;

pub use devices::{DeviceFactory, MockDevices, MockRfid, SystemDevices};
pub use error::{ErrorKind, Result, TerminalError};
pub use lease::{DeviceLease, DeviceLock};
pub use pending::PendingOperation;
pub use settings::{FileSettings, RfidMode, SettingsSource, StaticSettings, TerminalSettings};
pub use state_machine::{StateMachine, StateTransition, TerminalState};
pub use terminal::{Resolution, StageOutcome, StagedCard, Terminal};
