//! Real serial port link backed by the `serialport` crate.

use crate::error::{HardwareError, Result};
use crate::traits::SerialLink;
use crate::types::SerialSettings;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::debug;

/// An open RS-232 port.
///
/// The port is closed when the link is dropped.
pub struct SerialPortLink {
    name: String,
    port: Box<dyn SerialPort>,
    write_timeout: Duration,
}

impl SerialPortLink {
    /// Open the port described by `settings` as 8N1 without flow control.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::OpenFailed` if the port cannot be opened.
    pub fn open(settings: &SerialSettings) -> Result<Self> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| HardwareError::open_failed(&settings.port, e.description))?;

        debug!(port = %settings.port, baud = settings.baud_rate, "Serial port opened");

        Ok(Self {
            name: settings.port.clone(),
            port,
            write_timeout: settings.write_timeout,
        })
    }
}

impl std::fmt::Debug for SerialPortLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortLink")
            .field("name", &self.name)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

impl SerialLink for SerialPortLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.set_timeout(self.write_timeout)?;
        match self.port.write_all(bytes).and_then(|()| self.port.flush()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::TimedOut => Err(HardwareError::timeout(
                self.write_timeout.as_millis() as u64,
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.port.set_timeout(timeout)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

impl Drop for SerialPortLink {
    fn drop(&mut self) {
        debug!(port = %self.name, "Serial port closed");
    }
}
