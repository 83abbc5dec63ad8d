//! Serial link abstraction.
//!
//! The dispenser and the serial RFID sensor both hang off an RS-232 line.
//! [`SerialLink`] is the contract between the drivers and the port, so the
//! same driver code runs against a real port or a scripted mock.
//!
//! The trait is blocking on purpose: the drivers run inside
//! `tokio::task::spawn_blocking`, and the underlying port API is blocking.

use crate::error::Result;
use std::time::Duration;

/// A byte-oriented, half-duplex serial line.
///
/// Dropping the link closes the port.
pub trait SerialLink: Send {
    /// Name of the port (`COM5`, `/dev/ttyUSB0`, ...), used in logs and errors.
    fn name(&self) -> &str;

    /// Write every byte of `bytes`, bounded by the link's write timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the write times out or the port fails.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read whatever is available into `buf`, waiting at most `timeout`
    /// for the first byte.
    ///
    /// Returns `Ok(0)` when nothing arrived within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port fails.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Discard everything received but not yet read.
    ///
    /// # Errors
    ///
    /// Returns an error if the port fails.
    fn clear_input(&mut self) -> Result<()>;

    /// Read a single byte, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port fails.
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read_timeout(&mut byte, timeout)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Read one chunk of available bytes, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port fails.
    fn read_chunk(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let mut buf = [0u8; 256];
        let n = self.read_timeout(&mut buf, timeout)?;
        Ok(buf[..n].to_vec())
    }
}
