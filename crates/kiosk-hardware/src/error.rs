//! Error types for hardware operations.
//!
//! This module defines error types specific to the serial links and the
//! card dispenser driver, covering port failures, timeouts, missing
//! acknowledgements and protocol errors.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Port could not be opened.
    #[error("Failed to open {port}: {message}")]
    OpenFailed { port: String, message: String },

    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The dispenser did not acknowledge a command that requires it.
    #[error("No ACK from {device} for {command}")]
    NoAck { device: String, command: String },

    /// Device communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Smart-card subsystem error.
    #[error("Smart-card error: {message}")]
    SmartCard { message: String },

    /// Device configuration error.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// Frame or status decoding error.
    #[error(transparent)]
    Protocol(#[from] kiosk_core::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new open failed error.
    pub fn open_failed(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenFailed {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new missing acknowledgement error.
    pub fn no_ack(device: impl Into<String>, command: impl ToString) -> Self {
        Self::NoAck {
            device: device.into(),
            command: command.to_string(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new smart-card error.
    pub fn smart_card(message: impl Into<String>) -> Self {
        Self::SmartCard {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }
}

impl From<serialport::Error> for HardwareError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => Self::disconnected(err.description),
            serialport::ErrorKind::Io(kind) => {
                Self::Io(std::io::Error::new(kind, err.description))
            }
            _ => Self::communication(err.description),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_failed_error() {
        let error = HardwareError::open_failed("/dev/ttyUSB0", "permission denied");
        assert!(matches!(error, HardwareError::OpenFailed { .. }));
        assert_eq!(
            error.to_string(),
            "Failed to open /dev/ttyUSB0: permission denied"
        );
    }

    #[test]
    fn test_timeout_error() {
        let error = HardwareError::timeout(1000);
        assert!(matches!(error, HardwareError::Timeout { .. }));
        assert_eq!(error.to_string(), "Operation timeout after 1000ms");
    }

    #[test]
    fn test_no_ack_error() {
        let error = HardwareError::no_ack("COM5", "AP");
        assert_eq!(error.to_string(), "No ACK from COM5 for AP");
    }

    #[test]
    fn test_protocol_error_is_transparent() {
        let error: HardwareError = kiosk_core::Error::malformed_status("too short").into();
        assert_eq!(error.to_string(), "Malformed status frame: too short");
    }

    #[test]
    fn test_serialport_error_mapping() {
        let missing = serialport::Error::new(serialport::ErrorKind::NoDevice, "COM9 not found");
        assert!(matches!(
            HardwareError::from(missing),
            HardwareError::Disconnected { .. }
        ));

        let io = serialport::Error::new(
            serialport::ErrorKind::Io(std::io::ErrorKind::TimedOut),
            "timed out",
        );
        assert!(matches!(HardwareError::from(io), HardwareError::Io(_)));
    }
}
