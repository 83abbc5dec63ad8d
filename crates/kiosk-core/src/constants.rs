//! Core constants for the CRT dispenser protocol and terminal workflow.
//!
//! The dispenser speaks a compact binary protocol over an RS-232 line:
//!
//! ```text
//! <STX> C1 C2 <ETX> <BCC>          short command frame
//! <STX> 'F' 'C' '0'+n <ETX> <BCC>  position command frame
//! ```
//!
//! Where:
//! - `<STX>` - Start of text marker (0x02)
//! - `C1 C2` - Two ASCII command characters (`DC`, `CP`, `AP`)
//! - `<ETX>` - End of text marker (0x03)
//! - `<BCC>` - XOR of every preceding byte, STX and ETX included
//!
//! After a command frame the device answers with a single ACK byte. The host
//! then sends ENQ to let the device emit its follow-up frame.
//!
//! # Usage
//!
//! ```
//! use kiosk_core::constants::*;
//!
//! let frame = [START_BYTE, b'D', b'C', END_BYTE];
//! let bcc = frame.iter().fold(0u8, |acc, b| acc ^ b);
//! assert_eq!(bcc, 0x46);
//! ```
//!
//! Timing defaults below were tuned against real hardware. They are
//! exposed as configuration, these values only seed it.

// ============================================================================
// Framing bytes
// ============================================================================

/// Start of text marker that opens every frame.
pub const START_BYTE: u8 = 0x02; // STX

/// End of text marker that closes the payload, followed by the checksum.
pub const END_BYTE: u8 = 0x03; // ETX

/// Enquiry byte the host sends to solicit the device's follow-up frame.
pub const ENQ_BYTE: u8 = 0x05;

/// Positive acknowledgement returned by the device for an accepted frame.
pub const ACK_BYTE: u8 = 0x06;

/// Length of a short command frame (STX, two command bytes, ETX, BCC).
pub const SHORT_FRAME_LEN: usize = 5;

/// Length of a position command frame (STX, `F`, `C`, digit, ETX, BCC).
pub const POSITION_FRAME_LEN: usize = 6;

// ============================================================================
// Commands
// ============================================================================

/// Dispense the staged card to the user.
pub const CMD_DISPENSE: &str = "DC";

/// Retract the card back into the capture bin.
pub const CMD_RETRACT: &str = "CP";

/// Request the card-position sensor status.
pub const CMD_STATUS: &str = "AP";

/// Prefix of the position command (followed by the position digit).
pub const CMD_POSITION_PREFIX: &str = "FC";

/// Highest position digit accepted by the position command.
pub const MAX_POSITION: u8 = 9;

/// Position that moves a card from the hopper to the RFID read area.
pub const READ_POSITION: u8 = 2;

// ============================================================================
// Status frame
// ============================================================================

/// Signature that opens a status response: STX, `S`, `F`.
pub const STATUS_SIGNATURE: [u8; 3] = [START_BYTE, b'S', b'F'];

/// Minimum number of bytes a status response must carry.
pub const STATUS_MIN_LEN: usize = 7;

/// Size of the buffer used to collect a status response.
pub const STATUS_BUFFER_LEN: usize = 32;

/// Byte offset of the pre-empty flag within a status response.
pub const STATUS_PRE_EMPTY_OFFSET: usize = 5;

/// Bit mask of the pre-empty flag.
pub const STATUS_PRE_EMPTY_MASK: u8 = 0b0000_0001;

/// Byte offset of the empty flag within a status response.
pub const STATUS_EMPTY_OFFSET: usize = 6;

/// Bit mask of the empty flag.
pub const STATUS_EMPTY_MASK: u8 = 0b0000_1000;

// ============================================================================
// Serial line
// ============================================================================

/// Baud rate of both the dispenser and the serial RFID sensor.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Read timeout for serial ports (milliseconds).
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Write timeout for serial ports (milliseconds).
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;

/// Pause between an ACK and the ENQ that follows it (milliseconds).
pub const ENQ_PRE_DELAY_MS: u64 = 100;

/// Pause after ENQ before draining the follow-up frame (milliseconds).
pub const ENQ_POST_DELAY_MS: u64 = 400;

/// Read timeout used while draining trailing bytes (milliseconds).
pub const DRAIN_TIMEOUT_MS: u64 = 50;

// ============================================================================
// RFID identification
// ============================================================================

/// Overall identification window (milliseconds).
pub const DEFAULT_RFID_READ_TIMEOUT_MS: u64 = 7000;

/// Minimum capture window after the first chunk arrives (milliseconds).
pub const DEFAULT_RFID_INITIAL_WINDOW_MS: u64 = 1500;

/// Silence on the RFID line that ends a burst (milliseconds).
pub const DEFAULT_RFID_IDLE_GAP_MS: u64 = 300;

/// Poll interval of the smart-card reader loop (milliseconds).
pub const PCSC_POLL_INTERVAL_MS: u64 = 200;

/// Token some serial readers emit when the field is empty.
pub const NO_CARD_SENTINEL: &str = "no card";

// ============================================================================
// Workflow
// ============================================================================

/// Seconds a staged card waits for a confirm/deny decision.
pub const DEFAULT_CONFIRM_TIMEOUT_SECONDS: u64 = 30;

/// Delay between a dispense and the safety retract (milliseconds).
pub const DEFAULT_DISPENSE_RETRACT_DELAY_MS: u64 = 15_000;

/// Positioning attempts per stage request.
pub const DEFAULT_STAGE_ATTEMPTS: u32 = 1;

/// Upper bound accepted for `stage_attempts`.
pub const MAX_STAGE_ATTEMPTS: u32 = 10;

/// Number of lifecycle transitions kept for diagnostics.
pub const MAX_HISTORY_SIZE: usize = 100;
