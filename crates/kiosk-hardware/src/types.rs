//! Common types shared across the serial link implementations and drivers.
//!
//! This module defines port parameters and the timing profile of the
//! dispenser handshake.

use kiosk_core::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS, DEFAULT_WRITE_TIMEOUT_MS, DRAIN_TIMEOUT_MS,
    ENQ_POST_DELAY_MS, ENQ_PRE_DELAY_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters for opening a serial port.
///
/// The line is always 8N1 without flow control; only the port name, speed
/// and timeouts vary between installations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Port name (e.g., "COM5", "/dev/ttyUSB0").
    pub port: String,

    /// Line speed.
    pub baud_rate: u32,

    /// Default read timeout.
    pub read_timeout: Duration,

    /// Write timeout.
    pub write_timeout: Duration,
}

impl SerialSettings {
    /// Create settings for `port` with the default speed and timeouts.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
        }
    }

    /// Set the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read and write timeouts.
    pub fn with_timeouts(mut self, read_timeout: Duration, write_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self.write_timeout = write_timeout;
        self
    }
}

/// Timing profile of the ACK/ENQ handshake.
///
/// The defaults were measured against real dispensers; tests shrink them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrtTimings {
    /// How long to wait for the ACK byte after a command frame.
    pub ack_timeout: Duration,

    /// Pause between the ACK and the ENQ byte.
    pub enq_pre_delay: Duration,

    /// Pause after the ENQ byte before draining the follow-up frame.
    pub enq_post_delay: Duration,

    /// Read timeout used while draining trailing bytes.
    pub drain_timeout: Duration,

    /// How long to collect a status response.
    pub status_timeout: Duration,
}

impl CrtTimings {
    /// Timings derived from the port's read timeout.
    pub fn for_read_timeout(read_timeout: Duration) -> Self {
        Self {
            ack_timeout: read_timeout,
            status_timeout: read_timeout,
            ..Self::default()
        }
    }
}

impl Default for CrtTimings {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            enq_pre_delay: Duration::from_millis(ENQ_PRE_DELAY_MS),
            enq_post_delay: Duration::from_millis(ENQ_POST_DELAY_MS),
            drain_timeout: Duration::from_millis(DRAIN_TIMEOUT_MS),
            status_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        }
    }
}
