//! Wire protocol of the CRT card dispenser.
//!
//! Builds the outbound command frames (STX, command, ETX, XOR checksum) and
//! decodes the status response returned after an `AP` query.

pub mod commands;
pub mod frame;
pub mod status;

pub use commands::CommandCode;
pub use frame::{Frame, checksum, hex};
pub use status::{is_complete as status_complete, parse_status};
