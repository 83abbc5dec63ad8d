use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Identifier of a staged card awaiting confirmation.
///
/// Rendered as a lowercase hyphenated UUID. Callers may echo it back in
/// any letter case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a fresh random operation id.
    #[must_use]
    pub fn new() -> Self {
        OperationId(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Check whether `candidate` names this operation.
    ///
    /// The comparison ignores letter case and runs in constant time over
    /// the canonical form, so the echoed id leaks nothing through timing.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let ours = self.to_string();
        let theirs = candidate.trim().to_ascii_lowercase();
        if ours.len() != theirs.len() {
            return false;
        }
        ours.as_bytes().ct_eq(theirs.as_bytes()).into()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for OperationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(OperationId)
            .map_err(|_| Error::InvalidOperationId(s.to_string()))
    }
}

/// Card-position sensor reading of the dispenser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CardStatus {
    /// The hopper is empty.
    Empty = 0,
    /// The hopper is running low.
    PreEmpty = 1,
    /// Cards are available.
    HasCard = 2,
}

impl CardStatus {
    /// Create a card status from its numeric code.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardStatus` if the code is not 0, 1 or 2.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(CardStatus::Empty),
            1 => Ok(CardStatus::PreEmpty),
            2 => Ok(CardStatus::HasCard),
            _ => Err(Error::InvalidCardStatus(code)),
        }
    }

    /// Numeric code reported to HTTP callers.
    #[inline]
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CardStatus::Empty => write!(f, "Empty"),
            CardStatus::PreEmpty => write!(f, "PreEmpty"),
            CardStatus::HasCard => write!(f, "HasCard"),
        }
    }
}

/// How the identifier string of an [`Identification`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// Decimal token taken verbatim from a serial RFID sensor.
    Token,
    /// Uppercase hexadecimal UID returned by a smart-card reader.
    HexUid,
}

/// Identity of the card staged in the dispenser.
///
/// Produced once per stage attempt by the RFID stage and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    /// Identifier string (decimal token or hex UID).
    pub identifier: String,

    /// Origin of `identifier`.
    pub kind: IdentifierKind,

    /// Wiegand-26 facility code, when the UID could be decoded.
    pub facility: Option<u8>,

    /// Wiegand-26 card number, when the UID could be decoded.
    pub card_number: Option<u16>,

    /// Smart-card reader that produced the UID.
    pub reader: Option<String>,
}

impl Identification {
    /// Identification carrying a raw token from a serial sensor.
    pub fn token(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            kind: IdentifierKind::Token,
            facility: None,
            card_number: None,
            reader: None,
        }
    }

    /// Identification carrying a hex UID from a smart-card reader.
    pub fn hex_uid(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            kind: IdentifierKind::HexUid,
            facility: None,
            card_number: None,
            reader: None,
        }
    }

    /// Attach a decoded Wiegand-26 facility code and card number.
    #[must_use]
    pub fn with_wiegand(mut self, facility: u8, card_number: u16) -> Self {
        self.facility = Some(facility);
        self.card_number = Some(card_number);
        self
    }

    /// Attach the name of the reader that produced the UID.
    #[must_use]
    pub fn with_reader(mut self, reader: impl Into<String>) -> Self {
        self.reader = Some(reader.into());
        self
    }
}

impl fmt::Display for Identification {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.facility, self.card_number) {
            (Some(facility), Some(card)) => {
                write!(f, "{} (facility {facility}, card {card})", self.identifier)
            }
            _ => write!(f, "{}", self.identifier),
        }
    }
}
