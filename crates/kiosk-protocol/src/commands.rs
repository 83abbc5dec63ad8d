//! Command codes understood by the CRT dispenser.
//!
//! Every command travels as two ASCII characters inside a frame. The
//! position command carries a third character, the target position digit.
//!
//! | Command | Wire | Effect |
//! |---------|------|--------|
//! | `Dispense` | `DC` | Push the staged card out to the user |
//! | `Retract` | `CP` | Pull the card back into the capture bin |
//! | `Status` | `AP` | Report the card-position sensors |
//! | `Position(n)` | `FC` + `'0'+n` | Move a card from the hopper to position `n` |
//!
//! # Examples
//!
//! ```
//! use kiosk_protocol::CommandCode;
//!
//! let cmd = CommandCode::parse("DC").unwrap();
//! assert_eq!(cmd, CommandCode::Dispense);
//! assert_eq!(cmd.as_str(), "DC");
//!
//! let pos = CommandCode::position(2).unwrap();
//! assert_eq!(pos.to_string(), "FC2");
//! ```

use kiosk_core::constants::{
    CMD_DISPENSE, CMD_POSITION_PREFIX, CMD_RETRACT, CMD_STATUS, MAX_POSITION,
};
use kiosk_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command codes for dispenser frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandCode {
    Dispense,     // DC
    Retract,      // CP
    Status,       // AP
    Position(u8), // FC + digit
}

impl CommandCode {
    /// Parse a wire command (`DC`, `CP`, `AP` or `FC0`..`FC9`).
    ///
    /// # Errors
    /// Returns `Error::InvalidCommandCode` for anything else, and
    /// `Error::InvalidPosition` for a position digit outside 0-9.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            CMD_DISPENSE => Ok(CommandCode::Dispense),
            CMD_RETRACT => Ok(CommandCode::Retract),
            CMD_STATUS => Ok(CommandCode::Status),
            _ => match s.strip_prefix(CMD_POSITION_PREFIX) {
                Some(digit) if digit.len() == 1 => {
                    let byte = digit.as_bytes()[0];
                    if byte.is_ascii_digit() {
                        Self::position(byte - b'0')
                    } else {
                        Err(Error::InvalidCommandCode(s.to_string()))
                    }
                }
                _ => Err(Error::InvalidCommandCode(s.to_string())),
            },
        }
    }

    /// Create a validated position command.
    ///
    /// # Errors
    /// Returns `Error::InvalidPosition` if `position` is greater than 9.
    pub fn position(position: u8) -> Result<Self> {
        if position > MAX_POSITION {
            return Err(Error::InvalidPosition(position));
        }
        Ok(CommandCode::Position(position))
    }

    /// The two command characters carried by the frame.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandCode::Dispense => CMD_DISPENSE,
            CommandCode::Retract => CMD_RETRACT,
            CommandCode::Status => CMD_STATUS,
            CommandCode::Position(_) => CMD_POSITION_PREFIX,
        }
    }

    /// Payload bytes between STX and ETX.
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = self.as_str().as_bytes().to_vec();
        if let CommandCode::Position(position) = self {
            payload.push(b'0' + position);
        }
        payload
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandCode::Position(position) => write!(f, "{CMD_POSITION_PREFIX}{position}"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}
