//! Mock card identifier for testing and development.
//!
//! Each identify call consumes the next scripted read. An empty script reads
//! nothing.

use crate::traits::CardIdentifier;
use kiosk_core::Identification;
use kiosk_hardware::{HardwareError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Outcome of one scripted read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRead {
    /// The card is identified after `delay`. A delay longer than the window
    /// reads nothing.
    Identified {
        identification: Identification,
        delay: Duration,
    },

    /// Nothing is read within the window.
    Nothing,

    /// The device fails.
    Fail(String),
}

#[derive(Debug, Default)]
struct IdentifierState {
    script: VecDeque<MockRead>,
    prepares: usize,
    identifies: usize,
    opens: usize,
    open: bool,
    fail_open: bool,
}

/// Mock card identifier.
///
/// # Examples
///
/// ```
/// use kiosk_core::Identification;
/// use kiosk_rfid::{CardIdentifier, MockIdentifier};
/// use std::time::Duration;
///
/// let (mut identifier, handle) = MockIdentifier::new("mock");
/// handle.push_identified(Identification::token("045678"));
///
/// let id = identifier.identify(Duration::from_millis(10)).unwrap().unwrap();
/// assert_eq!(id.identifier, "045678");
/// assert!(identifier.identify(Duration::from_millis(1)).unwrap().is_none());
/// ```
#[derive(Debug)]
pub struct MockIdentifier {
    name: String,
    state: Arc<Mutex<IdentifierState>>,
}

impl MockIdentifier {
    /// Create an open mock identifier and the handle that scripts it.
    pub fn new(name: impl Into<String>) -> (Self, MockIdentifierHandle) {
        let handle = MockIdentifierHandle::new(name);
        let identifier = handle.attach();
        (identifier, handle)
    }

    fn state(&self) -> MutexGuard<'_, IdentifierState> {
        lock(&self.state)
    }
}

impl CardIdentifier for MockIdentifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self) -> Result<()> {
        self.state().prepares += 1;
        Ok(())
    }

    fn identify(&mut self, window: Duration) -> Result<Option<Identification>> {
        let read = {
            let mut state = self.state();
            state.identifies += 1;
            state.script.pop_front()
        };

        match read {
            Some(MockRead::Identified {
                identification,
                delay,
            }) => {
                if delay > window {
                    thread::sleep(window);
                    Ok(None)
                } else {
                    thread::sleep(delay);
                    Ok(Some(identification))
                }
            }
            Some(MockRead::Nothing) | None => Ok(None),
            Some(MockRead::Fail(message)) => Err(HardwareError::communication(message)),
        }
    }
}

impl Drop for MockIdentifier {
    fn drop(&mut self) {
        self.state().open = false;
    }
}

/// Handle for controlling a mock card identifier.
#[derive(Debug, Clone)]
pub struct MockIdentifierHandle {
    name: String,
    state: Arc<Mutex<IdentifierState>>,
}

impl MockIdentifierHandle {
    /// Create a handle for an identifier that is not open yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(IdentifierState::default())),
        }
    }

    /// Open an identifier scripted by this handle.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::OpenFailed` after [`fail_open`](Self::fail_open).
    pub fn open(&self) -> Result<MockIdentifier> {
        if self.state().fail_open {
            return Err(HardwareError::open_failed(&self.name, "reader unavailable"));
        }
        Ok(self.attach())
    }

    fn attach(&self) -> MockIdentifier {
        let mut state = self.state();
        state.open = true;
        state.opens += 1;
        MockIdentifier {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
        }
    }

    fn state(&self) -> MutexGuard<'_, IdentifierState> {
        lock(&self.state)
    }

    /// Script a read.
    pub fn push(&self, read: MockRead) {
        self.state().script.push_back(read);
    }

    /// Script an immediate identification.
    pub fn push_identified(&self, identification: Identification) {
        self.push_delayed(identification, Duration::ZERO);
    }

    /// Script an identification that takes `delay`.
    pub fn push_delayed(&self, identification: Identification, delay: Duration) {
        self.push(MockRead::Identified {
            identification,
            delay,
        });
    }

    /// Script a read that finds nothing.
    pub fn push_nothing(&self) {
        self.push(MockRead::Nothing);
    }

    /// Script a device failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.push(MockRead::Fail(message.into()));
    }

    /// Make every subsequent [`open`](Self::open) fail.
    pub fn fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    /// Number of prepare calls.
    pub fn prepares(&self) -> usize {
        self.state().prepares
    }

    /// Number of identify calls.
    pub fn identifies(&self) -> usize {
        self.state().identifies
    }

    /// Number of times the identifier was opened.
    pub fn opens(&self) -> usize {
        self.state().opens
    }

    /// Whether an identifier is currently open.
    pub fn is_open(&self) -> bool {
        self.state().open
    }
}

fn lock(state: &Mutex<IdentifierState>) -> MutexGuard<'_, IdentifierState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
