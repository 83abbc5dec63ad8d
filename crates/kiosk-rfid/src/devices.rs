//! Enum wrapper for card identifier dispatch.
//!
//! The identification strategy is chosen by configuration on every stage
//! request. [`AnyIdentifier`] gives the workflow one concrete type for all
//! of them.

use crate::burst::SerialBurstReader;
use crate::mock::MockIdentifier;
use crate::pcsc::PcscIdentifier;
use crate::traits::CardIdentifier;
use kiosk_core::Identification;
use kiosk_hardware::Result;
use std::time::Duration;

/// Enum wrapper for card identifier dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyIdentifier {
    /// Serial RFID sensor.
    Serial(SerialBurstReader),

    /// PC/SC smart-card reader.
    Pcsc(PcscIdentifier),

    /// Mock identifier for development and testing.
    Mock(MockIdentifier),
}

impl CardIdentifier for AnyIdentifier {
    fn name(&self) -> &str {
        match self {
            Self::Serial(identifier) => identifier.name(),
            Self::Pcsc(identifier) => identifier.name(),
            Self::Mock(identifier) => identifier.name(),
        }
    }

    fn prepare(&mut self) -> Result<()> {
        match self {
            Self::Serial(identifier) => identifier.prepare(),
            Self::Pcsc(identifier) => identifier.prepare(),
            Self::Mock(identifier) => identifier.prepare(),
        }
    }

    fn identify(&mut self, window: Duration) -> Result<Option<Identification>> {
        match self {
            Self::Serial(identifier) => identifier.identify(window),
            Self::Pcsc(identifier) => identifier.identify(window),
            Self::Mock(identifier) => identifier.identify(window),
        }
    }
}

impl From<SerialBurstReader> for AnyIdentifier {
    fn from(identifier: SerialBurstReader) -> Self {
        Self::Serial(identifier)
    }
}

impl From<PcscIdentifier> for AnyIdentifier {
    fn from(identifier: PcscIdentifier) -> Self {
        Self::Pcsc(identifier)
    }
}

impl From<MockIdentifier> for AnyIdentifier {
    fn from(identifier: MockIdentifier) -> Self {
        Self::Mock(identifier)
    }
}
