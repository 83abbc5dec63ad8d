//! Shared vocabulary for the card-dispensing terminal.
//!
//! Every other crate in the workspace speaks in the types defined here:
//! protocol constants for the CRT dispenser, the operation identifier that
//! ties a staged card to its confirmation, the card-position status and
//! the identification produced by the RFID stage.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
