use crate::commands::CommandCode;
use bytes::{BufMut, Bytes, BytesMut};
use kiosk_core::{Error, Result, constants::*};
use std::fmt;

/// Frame represents an outbound command in the dispenser's wire format.
///
/// A Frame contains the raw bytes exactly as written to the serial line,
/// framing markers and checksum included. It is immutable once built.
///
/// # Wire Format
/// ```text
/// 02 44 43 03 46        DC (dispense)
/// 02 43 50 03 12        CP (retract)
/// 02 46 43 32 03 36     FC2 (move card to the read position)
/// ^^ ^^^^^^^^ ^^ ^^
/// STX payload ETX BCC
/// ```
///
/// The block check character (BCC) is the XOR of every preceding byte,
/// STX and ETX included.
///
/// # Basic Usage
/// ```
/// use kiosk_protocol::{CommandCode, Frame};
///
/// let frame = Frame::new(CommandCode::Dispense);
/// assert_eq!(frame.as_bytes(), &[0x02, 0x44, 0x43, 0x03, 0x46]);
///
/// let position = Frame::position(2).unwrap();
/// assert_eq!(position.len(), 6);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw bytes of the frame including STX, ETX and BCC
    data: Bytes,

    /// Command carried by the frame
    command: CommandCode,
}

impl Frame {
    /// Build the frame for a command.
    pub fn new(command: CommandCode) -> Self {
        let payload = command.payload();
        let mut buf = BytesMut::with_capacity(payload.len() + 3);
        buf.put_u8(START_BYTE);
        buf.put_slice(&payload);
        buf.put_u8(END_BYTE);
        let bcc = checksum(&buf);
        buf.put_u8(bcc);

        Frame {
            data: buf.freeze(),
            command,
        }
    }

    /// Build a short frame from a two-character wire code such as `"DC"`.
    ///
    /// # Errors
    /// Returns `Error::InvalidCommandCode` unless `code` is a known command.
    pub fn from_code(code: &str) -> Result<Self> {
        CommandCode::parse(code).map(Self::new)
    }

    /// Build a position frame (`FC` followed by the position digit).
    ///
    /// # Errors
    /// Returns `Error::InvalidPosition` if `position` is greater than 9.
    pub fn position(position: u8) -> Result<Self> {
        CommandCode::position(position).map(Self::new)
    }

    /// Decode a complete frame as written by a host.
    ///
    /// Used on the device side of a link (mocks, line sniffers) to recover the
    /// command from raw bytes.
    ///
    /// # Errors
    /// Returns an error for a missing STX/ETX, a bad checksum or an unknown
    /// command.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let len = bytes.len();
        if len != SHORT_FRAME_LEN && len != POSITION_FRAME_LEN {
            return Err(Error::InvalidCommandCode(format!(
                "frame of {len} bytes"
            )));
        }
        if bytes[0] != START_BYTE || bytes[len - 2] != END_BYTE {
            return Err(Error::InvalidCommandCode(hex(bytes)));
        }

        let expected = checksum(&bytes[..len - 1]);
        let actual = bytes[len - 1];
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        let payload = std::str::from_utf8(&bytes[1..len - 2])
            .map_err(|_| Error::InvalidCommandCode(hex(bytes)))?;
        Ok(Self::new(CommandCode::parse(payload)?))
    }

    /// Get the raw bytes of the frame
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Get the command carried by the frame
    pub fn command(&self) -> CommandCode {
        self.command
    }

    /// Get the frame size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Frames always carry at least STX, ETX and BCC
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The trailing block check character
    pub fn bcc(&self) -> u8 {
        self.data[self.data.len() - 1]
    }

    /// Consume the frame, returning its bytes
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<CommandCode> for Frame {
    fn from(command: CommandCode) -> Self {
        Frame::new(command)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.command, hex(&self.data))
    }
}

/// XOR of every byte in `bytes`.
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Render bytes as space separated uppercase hex, for logs.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
