//! Opening the dispenser and the card identifier.
//!
//! A lifecycle opens its ports when it starts and closes them when it ends.
//! [`DeviceFactory`] is the seam between the workflow and the hardware:
//! [`SystemDevices`] opens real serial ports and PC/SC readers,
//! [`MockDevices`] hands out scripted mocks whose handles the caller keeps.

use std::time::Duration;

use kiosk_hardware::mock::MockLinkHandle;
use kiosk_hardware::{AnyLink, CrtDriver, CrtTimings, Result};
use kiosk_rfid::{AnyIdentifier, MockIdentifierHandle, PcscIdentifier, SerialBurstReader};
use tracing::debug;

use crate::settings::{RfidMode, TerminalSettings};

/// Opens the devices a lifecycle needs.
///
/// Methods block; the terminal calls them inside `spawn_blocking`.
pub trait DeviceFactory: Send + Sync {
    /// Open the dispenser.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be opened.
    fn open_dispenser(&self, settings: &TerminalSettings) -> Result<CrtDriver>;

    /// Open the card identifier selected by `settings.rfid_mode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier cannot be opened.
    fn open_identifier(&self, settings: &TerminalSettings) -> Result<AnyIdentifier>;
}

/// Real serial ports and smart-card readers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDevices;

impl DeviceFactory for SystemDevices {
    fn open_dispenser(&self, settings: &TerminalSettings) -> Result<CrtDriver> {
        let link = AnyLink::open_serial(&settings.crt_serial())?;
        Ok(CrtDriver::with_timings(link, settings.crt_timings()))
    }

    fn open_identifier(&self, settings: &TerminalSettings) -> Result<AnyIdentifier> {
        match settings.rfid_mode {
            RfidMode::Serial => {
                let link = AnyLink::open_serial(&settings.rfid_serial())?;
                Ok(SerialBurstReader::with_timings(link, settings.burst_timings()).into())
            }
            RfidMode::Pcsc => {
                debug!(hint = ?settings.pcsc_reader_hint, "Using smart-card reader");
                Ok(PcscIdentifier::new(settings.pcsc_reader_hint.clone()).into())
            }
        }
    }
}

/// Where [`MockDevices`] gets card identities from.
#[derive(Debug, Clone)]
pub enum MockRfid {
    /// Scripted identifier, regardless of `rfid_mode`.
    Scripted(MockIdentifierHandle),
    /// Serial sensor line feeding a real burst reader.
    Serial(MockLinkHandle),
}

/// Scripted devices for tests and dry runs.
///
/// The dispenser driver uses short handshake timings so lifecycles finish
/// in milliseconds.
#[derive(Debug, Clone)]
pub struct MockDevices {
    crt: MockLinkHandle,
    rfid: MockRfid,
    timings: CrtTimings,
}

impl MockDevices {
    /// Mock dispenser plus a scripted identifier.
    pub fn new() -> Self {
        Self {
            crt: MockLinkHandle::new("mock-crt"),
            rfid: MockRfid::Scripted(MockIdentifierHandle::new("mock-rfid")),
            timings: fast_timings(),
        }
    }

    /// Mock dispenser plus a mock serial sensor line.
    pub fn with_serial_rfid() -> Self {
        Self {
            rfid: MockRfid::Serial(MockLinkHandle::new("mock-rfid")),
            ..Self::new()
        }
    }

    /// Override the dispenser handshake timings.
    pub fn with_timings(mut self, timings: CrtTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Handle of the mock dispenser line.
    pub fn crt(&self) -> &MockLinkHandle {
        &self.crt
    }

    /// Handle of the scripted identifier.
    ///
    /// # Panics
    ///
    /// Panics if the devices were built with [`with_serial_rfid`](Self::with_serial_rfid).
    pub fn identifier(&self) -> &MockIdentifierHandle {
        match &self.rfid {
            MockRfid::Scripted(handle) => handle,
            MockRfid::Serial(_) => panic!("mock devices use a serial RFID line"),
        }
    }

    /// Handle of the mock RFID sensor line.
    ///
    /// # Panics
    ///
    /// Panics if the devices were built with [`new`](Self::new).
    pub fn rfid_line(&self) -> &MockLinkHandle {
        match &self.rfid {
            MockRfid::Serial(handle) => handle,
            MockRfid::Scripted(_) => panic!("mock devices use a scripted identifier"),
        }
    }

    /// Whether any mock port is currently open.
    pub fn any_open(&self) -> bool {
        let rfid_open = match &self.rfid {
            MockRfid::Scripted(handle) => handle.is_open(),
            MockRfid::Serial(handle) => handle.is_open(),
        };
        self.crt.is_open() || rfid_open
    }
}

impl Default for MockDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceFactory for MockDevices {
    fn open_dispenser(&self, _settings: &TerminalSettings) -> Result<CrtDriver> {
        let link = AnyLink::from(self.crt.open()?);
        Ok(CrtDriver::with_timings(link, self.timings))
    }

    fn open_identifier(&self, settings: &TerminalSettings) -> Result<AnyIdentifier> {
        match &self.rfid {
            MockRfid::Scripted(handle) => Ok(handle.open()?.into()),
            MockRfid::Serial(handle) => {
                let link = AnyLink::from(handle.open()?);
                Ok(SerialBurstReader::with_timings(link, settings.burst_timings()).into())
            }
        }
    }
}

fn fast_timings() -> CrtTimings {
    CrtTimings {
        ack_timeout: Duration::from_millis(20),
        enq_pre_delay: Duration::from_millis(1),
        enq_post_delay: Duration::from_millis(1),
        drain_timeout: Duration::from_millis(1),
        status_timeout: Duration::from_millis(50),
    }
}
