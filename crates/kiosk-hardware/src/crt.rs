//! Driver for the CRT card dispenser.
//!
//! Every command follows the same handshake:
//!
//! ```text
//! host                      device
//!  |--- STX cmd ETX BCC ---->|
//!  |<-------- ACK -----------|
//!  |   (enq_pre_delay)       |
//!  |---------- ENQ --------->|
//!  |   (enq_post_delay)      |
//!  |<--- follow-up frame ----|   drained, or parsed for `AP`
//! ```
//!
//! A missing ACK on a movement command is tolerated: it is logged and
//! reported through the return value, and the caller decides what to do.
//! A missing ACK on a status query is an error.

use crate::devices::AnyLink;
use crate::error::{HardwareError, Result};
use crate::traits::SerialLink;
use crate::types::CrtTimings;
use kiosk_core::CardStatus;
use kiosk_core::constants::{ACK_BYTE, ENQ_BYTE, STATUS_BUFFER_LEN};
use kiosk_protocol::{CommandCode, Frame, hex, parse_status, status_complete};
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// CRT dispenser driver over a serial link.
#[derive(Debug)]
pub struct CrtDriver<L: SerialLink = AnyLink> {
    link: L,
    timings: CrtTimings,
}

impl<L: SerialLink> CrtDriver<L> {
    /// Create a driver with the default timings.
    pub fn new(link: L) -> Self {
        Self::with_timings(link, CrtTimings::default())
    }

    /// Create a driver with explicit timings.
    pub fn with_timings(link: L, timings: CrtTimings) -> Self {
        Self { link, timings }
    }

    /// Port name of the underlying link.
    pub fn port(&self) -> &str {
        self.link.name()
    }

    /// Write a command frame. Never retried.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or times out.
    pub fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        debug!(port = %self.link.name(), frame = %frame, "Sending frame");
        self.link.write_all(frame.as_bytes())
    }

    /// Wait for the single ACK byte.
    ///
    /// Timeouts, foreign bytes and transport errors all count as "no ACK".
    pub fn await_ack(&mut self) -> bool {
        match self.link.read_byte(self.timings.ack_timeout) {
            Ok(Some(ACK_BYTE)) => true,
            Ok(Some(other)) => {
                warn!(port = %self.link.name(), byte = %format!("{other:#04X}"), "Expected ACK");
                false
            }
            Ok(None) => {
                warn!(
                    port = %self.link.name(),
                    timeout_ms = self.timings.ack_timeout.as_millis() as u64,
                    "No ACK before timeout"
                );
                false
            }
            Err(e) => {
                warn!(port = %self.link.name(), error = %e, "Reading ACK failed");
                false
            }
        }
    }

    /// Send `command` and, if it is acknowledged, complete the ENQ tail.
    ///
    /// Returns whether the device acknowledged the command.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures while writing.
    pub fn execute_with_enq(&mut self, command: CommandCode) -> Result<bool> {
        let frame = Frame::new(command);
        self.send_frame(&frame)?;

        if !self.await_ack() {
            warn!(port = %self.link.name(), command = %command, "Command not acknowledged");
            return Ok(false);
        }

        self.send_enq()?;
        thread::sleep(self.timings.enq_post_delay);
        self.drain();
        debug!(port = %self.link.name(), command = %command, "Command acknowledged");
        Ok(true)
    }

    /// Move a card to `position` (0-9).
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Protocol` for a position above 9, or a
    /// transport error while writing.
    pub fn execute_position(&mut self, position: u8) -> Result<bool> {
        let command = CommandCode::position(position)?;
        self.execute_with_enq(command)
    }

    /// Query the card-position sensors.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::NoAck` if `AP` is not acknowledged, and
    /// `HardwareError::Protocol` if the response is malformed.
    pub fn query_status(&mut self) -> Result<CardStatus> {
        self.link.clear_input()?;
        self.send_frame(&Frame::new(CommandCode::Status))?;

        if !self.await_ack() {
            return Err(HardwareError::no_ack(self.link.name(), CommandCode::Status));
        }

        self.send_enq()?;
        let response = self.read_status_response()?;
        debug!(port = %self.link.name(), response = %hex(&response), "Status response");

        let status = parse_status(&response)?;
        debug!(port = %self.link.name(), status = %status, "Card status");
        Ok(status)
    }

    /// Discard whatever the device still has to say.
    ///
    /// Stops at the first quiet read, or once `status_timeout` has passed
    /// while the device keeps talking.
    pub fn drain(&mut self) {
        let deadline = Instant::now() + self.timings.status_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(port = %self.link.name(), "Device still sending, drain abandoned");
                break;
            }
            match self.link.read_chunk(self.timings.drain_timeout.min(remaining)) {
                Ok(bytes) if bytes.is_empty() => break,
                Ok(bytes) => debug!(port = %self.link.name(), bytes = %hex(&bytes), "Drained"),
                Err(e) => {
                    debug!(port = %self.link.name(), error = %e, "Drain stopped");
                    break;
                }
            }
        }
    }

    /// Consume the driver, returning the link.
    pub fn into_inner(self) -> L {
        self.link
    }

    fn send_enq(&mut self) -> Result<()> {
        thread::sleep(self.timings.enq_pre_delay);
        self.link.write_all(&[ENQ_BYTE])
    }

    fn read_status_response(&mut self) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.timings.status_timeout;
        let mut response = Vec::with_capacity(STATUS_BUFFER_LEN);
        let mut buf = [0u8; STATUS_BUFFER_LEN];

        while response.len() < STATUS_BUFFER_LEN && !status_complete(&response) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let room = STATUS_BUFFER_LEN - response.len();
            let n = self.link.read_timeout(&mut buf[..room], remaining)?;
            if n == 0 {
                break;
            }
            response.extend_from_slice(&buf[..n]);
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLink, MockLinkHandle};
    use std::time::Duration;

    fn fast() -> CrtTimings {
        CrtTimings {
            ack_timeout: Duration::from_millis(20),
            enq_pre_delay: Duration::from_millis(1),
            enq_post_delay: Duration::from_millis(1),
            drain_timeout: Duration::from_millis(2),
            status_timeout: Duration::from_millis(30),
        }
    }

    fn driver() -> (CrtDriver<MockLink>, MockLinkHandle) {
        let (link, handle) = MockLink::new("COM5");
        (CrtDriver::with_timings(link, fast()), handle)
    }

    #[test]
    fn test_acknowledged_command_sends_enq() {
        let (mut crt, handle) = driver();
        handle.ack(CommandCode::Dispense);

        assert!(crt.execute_with_enq(CommandCode::Dispense).unwrap());
        assert_eq!(
            handle.written(),
            vec![vec![0x02, 0x44, 0x43, 0x03, 0x46], vec![0x05]]
        );
    }

    #[test]
    fn test_missing_ack_is_tolerated() {
        let (mut crt, handle) = driver();

        assert!(!crt.execute_with_enq(CommandCode::Retract).unwrap());
        assert_eq!(handle.commands(), vec![CommandCode::Retract]);
        assert_eq!(handle.enq_count(), 0);
    }

    #[test]
    fn test_foreign_byte_is_not_ack() {
        let (mut crt, handle) = driver();
        handle.respond(Frame::new(CommandCode::Retract).as_bytes(), &[0x15]);

        assert!(!crt.execute_with_enq(CommandCode::Retract).unwrap());
        assert_eq!(handle.enq_count(), 0);
    }

    #[test]
    fn test_trailing_bytes_are_drained() {
        let (mut crt, handle) = driver();
        handle.respond(Frame::position(2).unwrap().as_bytes(), &[0x06]);
        handle.respond(&[0x05], &[0x02, b'F', b'C', 0x03, 0x00]);

        assert!(crt.execute_position(2).unwrap());
        let mut link = crt.into_inner();
        assert!(link.read_chunk(Duration::from_millis(2)).unwrap().is_empty());
    }

    /// Line that answers every read with another byte.
    struct Chatty;

    impl SerialLink for Chatty {
        fn name(&self) -> &str {
            "chatty"
        }

        fn write_all(&mut self, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }

        fn read_timeout(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            thread::sleep(Duration::from_millis(1));
            buf[0] = 0x55;
            Ok(1)
        }

        fn clear_input(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_drain_gives_up_on_endless_input() {
        let mut crt = CrtDriver::with_timings(Chatty, fast());

        let started = Instant::now();
        crt.drain();

        assert!(started.elapsed() >= fast().status_timeout);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_position_out_of_range() {
        let (mut crt, handle) = driver();
        assert!(matches!(
            crt.execute_position(10),
            Err(HardwareError::Protocol(kiosk_core::Error::InvalidPosition(10)))
        ));
        assert!(handle.written().is_empty());
    }

    #[test]
    fn test_write_failure_propagates() {
        let (mut crt, handle) = driver();
        handle.fail_writes(true);
        assert!(crt.execute_with_enq(CommandCode::Dispense).is_err());
    }

    #[test]
    fn test_query_status() {
        let (mut crt, handle) = driver();
        handle.ack(CommandCode::Status);
        handle.respond(&[0x05], &[0x02, b'S', b'F', 0x30, 0x30, 0x31, 0x30, 0x03, 0x17]);

        assert_eq!(crt.query_status().unwrap(), CardStatus::PreEmpty);
        assert_eq!(handle.commands(), vec![CommandCode::Status]);
        assert_eq!(handle.enq_count(), 1);
    }

    #[test]
    fn test_query_status_collects_split_response() {
        let (mut crt, handle) = driver();
        handle.ack(CommandCode::Status);
        handle.respond(&[0x05], &[0x02, b'S', b'F', 0x30]);
        handle.respond(&[0x05], &[0x30, 0x30, 0x38, 0x03, 0x00]);

        assert_eq!(crt.query_status().unwrap(), CardStatus::Empty);
    }

    #[test]
    fn test_query_status_requires_ack() {
        let (mut crt, handle) = driver();

        assert!(matches!(
            crt.query_status(),
            Err(HardwareError::NoAck { .. })
        ));
        assert_eq!(handle.enq_count(), 0);
    }

    #[test]
    fn test_query_status_rejects_malformed_response() {
        let (mut crt, handle) = driver();
        handle.ack(CommandCode::Status);
        handle.respond(&[0x05], &[0x02, b'X', b'F', 0x30, 0x30, 0x30, 0x30]);

        assert!(matches!(
            crt.query_status(),
            Err(HardwareError::Protocol(kiosk_core::Error::MalformedStatus { .. }))
        ));
    }

    #[test]
    fn test_query_status_rejects_short_response() {
        let (mut crt, handle) = driver();
        handle.ack(CommandCode::Status);
        handle.respond(&[0x05], &[0x02, b'S', b'F']);

        assert!(crt.query_status().is_err());
    }
}
