//! Serial hardware layer for the card-dispensing terminal.
//!
//! This crate provides the serial link abstraction shared by the dispenser
//! and the serial RFID sensor, a real implementation on top of the
//! `serialport` crate, a scriptable mock, and the CRT dispenser driver that
//! speaks the ACK/ENQ handshake.
//!
//! # Design Philosophy
//!
//! - **Blocking core**: Port I/O is synchronous. Async callers run drivers
//!   inside `tokio::task::spawn_blocking`.
//! - **Enum dispatch**: [`AnyLink`] picks between real and mock links at
//!   runtime while drivers stay generic over [`SerialLink`].
//! - **RAII ports**: A link owns its port; dropping it closes the port.
//!
//! # Driving the dispenser
//!
//! ```no_run
//! use kiosk_hardware::{AnyLink, CrtDriver, SerialSettings};
//!
//! fn stage_card() -> kiosk_hardware::Result<bool> {
//!     let link = AnyLink::open_serial(&SerialSettings::new("/dev/ttyUSB0"))?;
//!     let mut crt = CrtDriver::new(link);
//!     crt.execute_position(2)
//! }
//! ```
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`][error::Result] with the
//! [`HardwareError`] error type. Missing acknowledgements on movement
//! commands are not errors; they are reported through the boolean result.

pub mod crt;
pub mod devices;
pub mod error;
pub mod mock;
pub mod serial;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use crt::CrtDriver;
pub use devices::AnyLink;
pub use error::{HardwareError, Result};
pub use serial::SerialPortLink;
pub use traits::SerialLink;
pub use types::{CrtTimings, SerialSettings};
