//! Card identification for the card-dispensing terminal.
//!
//! Once the dispenser has moved a card into its read position, one of the
//! identifiers in this crate reports which card it is:
//!
//! - [`SerialBurstReader`] listens to a serial RFID sensor and extracts the
//!   card token from the text burst it emits.
//! - [`PcscIdentifier`] polls PC/SC smart-card readers for the UID and
//!   decodes the Wiegand-26 facility code and card number.
//! - [`MockIdentifier`] replays a script, for tests.
//!
//! Not reading a card is a normal outcome (`Ok(None)`), distinct from a
//! device failure (`Err`).

pub mod burst;
pub mod devices;
pub mod mock;
pub mod pcsc;
pub mod traits;
pub mod wiegand;

pub use burst::{BurstTimings, SerialBurstReader, parse_burst};
pub use devices::AnyIdentifier;
pub use mock::{MockIdentifier, MockIdentifierHandle, MockRead};
pub use pcsc::{PcscIdentifier, rank_readers};
pub use traits::CardIdentifier;
pub use wiegand::{Wiegand26, uid_hex};
