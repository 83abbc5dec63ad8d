//! Wiegand-26 decoding of smart-card UIDs.
//!
//! Access-control installations print the 26-bit Wiegand number on the card
//! rather than the raw UID. The reader's UID bytes carry that number shifted
//! into the top of the first four bytes:
//!
//! ```text
//! v        = u32::from_be_bytes(uid[0..4]) >> 7 & 0x3FF_FFFF
//! facility = (v >> 16) & 0xFF
//! card     =  v        & 0xFFFF
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Mask of the 26 Wiegand bits.
const WIEGAND_26_MASK: u32 = 0x3FF_FFFF;

/// Right shift that aligns the Wiegand bits.
const WIEGAND_26_SHIFT: u32 = 7;

/// Facility code and card number of a Wiegand-26 credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Wiegand26 {
    /// Facility (site) code.
    pub facility: u8,

    /// Card number within the facility.
    pub card_number: u16,
}

impl Wiegand26 {
    /// Decode the credential from a UID.
    ///
    /// Returns `None` for UIDs shorter than four bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiosk_rfid::Wiegand26;
    ///
    /// let decoded = Wiegand26::decode(&[0xAB, 0x12, 0x34, 0x56]).unwrap();
    /// assert_eq!(decoded.facility, 86);
    /// assert_eq!(decoded.card_number, 9320);
    /// ```
    pub fn decode(uid: &[u8]) -> Option<Self> {
        let head: [u8; 4] = uid.get(..4)?.try_into().ok()?;
        let value = (u32::from_be_bytes(head) >> WIEGAND_26_SHIFT) & WIEGAND_26_MASK;

        Some(Self {
            facility: ((value >> 16) & 0xFF) as u8,
            card_number: (value & 0xFFFF) as u16,
        })
    }
}

impl fmt::Display for Wiegand26 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{:05}", self.facility, self.card_number)
    }
}

/// Render a UID as contiguous uppercase hex (`04AABBCC`).
pub fn uid_hex(uid: &[u8]) -> String {
    uid.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[0xAB, 0x12, 0x34, 0x56], 86, 9320)]
    #[case(&[0x04, 0xAA, 0xBB, 0xCC], 9, 21879)]
    #[case(&[0xAB, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC], 86, 9320)]
    #[case(&[0x00, 0x00, 0x00, 0x00], 0, 0)]
    fn test_decode(#[case] uid: &[u8], #[case] facility: u8, #[case] card: u16) {
        let decoded = Wiegand26::decode(uid).unwrap();
        assert_eq!(decoded.facility, facility);
        assert_eq!(decoded.card_number, card);
    }

    #[rstest]
    #[case(&[])]
    #[case(&[0xAB])]
    #[case(&[0xAB, 0x12, 0x34])]
    fn test_short_uid_not_decoded(#[case] uid: &[u8]) {
        assert!(Wiegand26::decode(uid).is_none());
    }

    #[test]
    fn test_display() {
        let decoded = Wiegand26 {
            facility: 9,
            card_number: 21879,
        };
        assert_eq!(decoded.to_string(), "009:21879");
    }

    #[test]
    fn test_uid_hex() {
        assert_eq!(uid_hex(&[0x04, 0xaa, 0xbb, 0x0c]), "04AABB0C");
        assert_eq!(uid_hex(&[]), "");
    }
}
