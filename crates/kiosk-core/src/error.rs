use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Protocol errors
    #[error("Invalid command code: {0}")]
    InvalidCommandCode(String),

    #[error("Invalid card position: {0} (expected 0-9)")]
    InvalidPosition(u8),

    #[error("Malformed status frame: {message}")]
    MalformedStatus { message: String },

    #[error("Checksum mismatch: expected {expected:#04X}, got {actual:#04X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    // Workflow vocabulary
    #[error("Invalid operation id: {0}")]
    InvalidOperationId(String),

    #[error("Invalid card status code: {0}")]
    InvalidCardStatus(i32),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a malformed status frame error.
    pub fn malformed_status(message: impl Into<String>) -> Self {
        Self::MalformedStatus {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
