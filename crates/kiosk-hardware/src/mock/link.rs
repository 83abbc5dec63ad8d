//! Mock serial link for testing and development.
//!
//! This module provides a simulated serial line whose receive side is
//! scripted through a handle. The handle also records every write, so tests
//! can assert the exact command sequence a driver produced.

use crate::error::{HardwareError, Result};
use crate::traits::SerialLink;
use kiosk_protocol::{CommandCode, Frame};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Scripted receive-side event.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RxEvent {
    /// Bytes available to the next read.
    Data(Vec<u8>),

    /// The line stays quiet for this long.
    Silence(Duration),
}

/// Automatic reply to a written byte sequence.
#[derive(Debug, Clone)]
struct Rule {
    when: Vec<u8>,
    reply: Vec<u8>,
}

/// State shared between a mock link and its handle.
#[derive(Debug, Default)]
struct LinkState {
    rx: VecDeque<RxEvent>,
    rules: Vec<Rule>,
    after_clear: VecDeque<Vec<RxEvent>>,
    written: Vec<Vec<u8>>,
    clears: usize,
    opens: usize,
    open: bool,
    fail_open: bool,
    fail_writes: bool,
}

/// Mock serial link for testing and development.
///
/// # Examples
///
/// ```
/// use kiosk_hardware::mock::MockLink;
/// use kiosk_hardware::traits::SerialLink;
/// use std::time::Duration;
///
/// let (mut link, handle) = MockLink::new("COM5");
///
/// // Answer every dispense frame with an ACK
/// handle.respond(&[0x02, 0x44, 0x43, 0x03, 0x46], &[0x06]);
///
/// link.write_all(&[0x02, 0x44, 0x43, 0x03, 0x46]).unwrap();
/// assert_eq!(link.read_byte(Duration::from_millis(10)).unwrap(), Some(0x06));
/// ```
#[derive(Debug)]
pub struct MockLink {
    name: String,
    state: Arc<Mutex<LinkState>>,
}

impl MockLink {
    /// Create an open mock link and the handle that scripts it.
    pub fn new(name: impl Into<String>) -> (Self, MockLinkHandle) {
        let handle = MockLinkHandle::new(name);
        let link = handle.attach();
        (link, handle)
    }

    fn state(&self) -> MutexGuard<'_, LinkState> {
        lock(&self.state)
    }
}

impl SerialLink for MockLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(HardwareError::communication(format!(
                "write to {} failed",
                self.name
            )));
        }

        state.written.push(bytes.to_vec());
        let replies: Vec<Vec<u8>> = state
            .rules
            .iter()
            .filter(|rule| rule.when == bytes)
            .map(|rule| rule.reply.clone())
            .collect();
        for reply in replies {
            state.rx.push_back(RxEvent::Data(reply));
        }
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut state = self.state();
        let event = state.rx.pop_front();
        match event {
            Some(RxEvent::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    state.rx.push_front(RxEvent::Data(data.split_off(n)));
                }
                Ok(n)
            }
            Some(RxEvent::Silence(remaining)) => {
                let quiet = remaining.min(timeout);
                if remaining > quiet {
                    state.rx.push_front(RxEvent::Silence(remaining - quiet));
                }
                drop(state);
                std::thread::sleep(quiet);
                Ok(0)
            }
            None => {
                drop(state);
                std::thread::sleep(timeout);
                Ok(0)
            }
        }
    }

    fn clear_input(&mut self) -> Result<()> {
        let mut state = self.state();
        state.clears += 1;
        state.rx.retain(|event| matches!(event, RxEvent::Silence(_)));
        if let Some(burst) = state.after_clear.pop_front() {
            state.rx.extend(burst);
        }
        Ok(())
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.state().open = false;
    }
}

/// Handle for controlling a mock serial link.
///
/// Cloning the handle shares the same line. The handle outlives the links it
/// opens, so tests can inspect what was written after the driver is gone.
#[derive(Debug, Clone)]
pub struct MockLinkHandle {
    name: String,
    state: Arc<Mutex<LinkState>>,
}

impl MockLinkHandle {
    /// Create a handle for a line that is not open yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(LinkState::default())),
        }
    }

    /// Open a link on this line.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::OpenFailed` after [`fail_open`](Self::fail_open).
    pub fn open(&self) -> Result<MockLink> {
        if self.state().fail_open {
            return Err(HardwareError::open_failed(&self.name, "port unavailable"));
        }
        Ok(self.attach())
    }

    fn attach(&self) -> MockLink {
        let mut state = self.state();
        state.open = true;
        state.opens += 1;
        MockLink {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
        }
    }

    fn state(&self) -> MutexGuard<'_, LinkState> {
        lock(&self.state)
    }

    /// Port name of the line.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue bytes for the next reads.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.state().rx.push_back(RxEvent::Data(bytes.to_vec()));
    }

    /// Queue a quiet period on the line.
    pub fn push_silence(&self, duration: Duration) {
        self.state().rx.push_back(RxEvent::Silence(duration));
    }

    /// Deliver `chunks` once the reader next clears its input.
    ///
    /// Each call scripts one burst; every clear releases the next one, so a
    /// reader that flushes stale input before a card moves still sees it.
    pub fn deliver_after_clear(&self, chunks: &[&[u8]]) {
        let burst = chunks
            .iter()
            .map(|chunk| RxEvent::Data(chunk.to_vec()))
            .collect();
        self.state().after_clear.push_back(burst);
    }

    /// Reply with `reply` every time exactly `when` is written.
    pub fn respond(&self, when: &[u8], reply: &[u8]) {
        self.state().rules.push(Rule {
            when: when.to_vec(),
            reply: reply.to_vec(),
        });
    }

    /// Acknowledge every frame carrying `command`.
    pub fn ack(&self, command: CommandCode) {
        self.respond(Frame::new(command).as_bytes(), &[kiosk_core::constants::ACK_BYTE]);
    }

    /// Acknowledge every command the dispenser understands.
    pub fn ack_all(&self) {
        self.ack(CommandCode::Dispense);
        self.ack(CommandCode::Retract);
        self.ack(CommandCode::Status);
        for position in 0..=kiosk_core::constants::MAX_POSITION {
            self.ack(CommandCode::Position(position));
        }
    }

    /// Make every subsequent [`open`](Self::open) fail.
    pub fn fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Every write, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    /// Commands recovered from the written frames, in order.
    ///
    /// Writes that are not frames (ENQ bytes) are skipped.
    pub fn commands(&self) -> Vec<CommandCode> {
        self.state()
            .written
            .iter()
            .filter_map(|bytes| Frame::decode(bytes).ok())
            .map(|frame| frame.command())
            .collect()
    }

    /// Number of times `command` was written.
    pub fn count(&self, command: CommandCode) -> usize {
        self.commands().iter().filter(|c| **c == command).count()
    }

    /// Number of ENQ bytes written.
    pub fn enq_count(&self) -> usize {
        self.state()
            .written
            .iter()
            .filter(|bytes| bytes.as_slice() == [kiosk_core::constants::ENQ_BYTE])
            .count()
    }

    /// Forget recorded writes.
    pub fn clear_written(&self) {
        self.state().written.clear();
    }

    /// Number of times the input buffer was cleared.
    pub fn clears(&self) -> usize {
        self.state().clears
    }

    /// Number of times the line was opened.
    pub fn opens(&self) -> usize {
        self.state().opens
    }

    /// Whether a link is currently open on this line.
    pub fn is_open(&self) -> bool {
        self.state().open
    }
}

fn lock(state: &Mutex<LinkState>) -> MutexGuard<'_, LinkState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
