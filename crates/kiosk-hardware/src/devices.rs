//! Enum wrapper for serial link dispatch.
//!
//! Drivers are generic over [`SerialLink`], but the terminal picks the
//! concrete link at runtime (a real port in production, a mock under test).
//! [`AnyLink`] provides that choice as a concrete type, keeping the drivers
//! monomorphic.
//!
//! # Examples
//!
//! ```
//! use kiosk_hardware::devices::AnyLink;
//! use kiosk_hardware::mock::MockLink;
//! use kiosk_hardware::traits::SerialLink;
//!
//! let (link, _handle) = MockLink::new("COM5");
//! let any_link = AnyLink::Mock(link);
//! assert_eq!(any_link.name(), "COM5");
//! ```

use crate::mock::MockLink;
use crate::serial::SerialPortLink;
use crate::traits::SerialLink;
use crate::types::SerialSettings;
use crate::Result;
use std::time::Duration;

/// Enum wrapper for serial link dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyLink {
    /// Real RS-232 port.
    Serial(SerialPortLink),

    /// Mock link for development and testing.
    Mock(MockLink),
}

impl AnyLink {
    /// Open a real serial port.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::OpenFailed` if the port cannot be opened.
    pub fn open_serial(settings: &SerialSettings) -> Result<Self> {
        SerialPortLink::open(settings).map(Self::Serial)
    }
}

impl SerialLink for AnyLink {
    fn name(&self) -> &str {
        match self {
            Self::Serial(link) => link.name(),
            Self::Mock(link) => link.name(),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Self::Serial(link) => link.write_all(bytes),
            Self::Mock(link) => link.write_all(bytes),
        }
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        match self {
            Self::Serial(link) => link.read_timeout(buf, timeout),
            Self::Mock(link) => link.read_timeout(buf, timeout),
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        match self {
            Self::Serial(link) => link.clear_input(),
            Self::Mock(link) => link.clear_input(),
        }
    }
}

impl From<SerialPortLink> for AnyLink {
    fn from(link: SerialPortLink) -> Self {
        Self::Serial(link)
    }
}

impl From<MockLink> for AnyLink {
    fn from(link: MockLink) -> Self {
        Self::Mock(link)
    }
}
