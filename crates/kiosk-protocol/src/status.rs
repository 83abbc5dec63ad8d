//! Decoding of the dispenser's status response.
//!
//! After `AP` is acknowledged and ENQ is sent, the device answers with a
//! frame opening `02 'S' 'F'`. Two sensor flags matter to the terminal:
//!
//! ```text
//! offset: 0  1   2   3  4  5          6
//!         02 'S' 'F' .. .. pre-empty  empty
//!                          bit 0      bit 3
//! ```
//!
//! The empty flag wins over the pre-empty flag.

use crate::frame::hex;
use kiosk_core::constants::{
    END_BYTE, STATUS_EMPTY_MASK, STATUS_EMPTY_OFFSET, STATUS_MIN_LEN,
    STATUS_PRE_EMPTY_MASK, STATUS_PRE_EMPTY_OFFSET, STATUS_SIGNATURE,
};
use kiosk_core::{CardStatus, Error, Result};

/// Decode the card status from a raw status response.
///
/// # Errors
/// Returns `Error::MalformedStatus` if the response is shorter than 7 bytes
/// or does not open with the status signature.
///
/// # Examples
/// ```
/// use kiosk_core::CardStatus;
/// use kiosk_protocol::parse_status;
///
/// let response = [0x02, b'S', b'F', 0x30, 0x30, 0x00, 0x08];
/// assert_eq!(parse_status(&response).unwrap(), CardStatus::Empty);
/// ```
pub fn parse_status(response: &[u8]) -> Result<CardStatus> {
    if response.len() < STATUS_MIN_LEN {
        return Err(Error::malformed_status(format!(
            "expected at least {STATUS_MIN_LEN} bytes, got {} [{}]",
            response.len(),
            hex(response)
        )));
    }

    if !response.starts_with(&STATUS_SIGNATURE) {
        return Err(Error::malformed_status(format!(
            "unexpected prefix [{}]",
            hex(response)
        )));
    }

    if response[STATUS_EMPTY_OFFSET] & STATUS_EMPTY_MASK != 0 {
        Ok(CardStatus::Empty)
    } else if response[STATUS_PRE_EMPTY_OFFSET] & STATUS_PRE_EMPTY_MASK != 0 {
        Ok(CardStatus::PreEmpty)
    } else {
        Ok(CardStatus::HasCard)
    }
}

/// Returns `true` once `buffer` holds a terminated frame (ETX after the
/// sensor bytes, followed by its BCC), so a reader can stop collecting early.
pub fn is_complete(buffer: &[u8]) -> bool {
    buffer.len() >= STATUS_MIN_LEN + 2 && buffer[buffer.len() - 2] == END_BYTE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn response(byte5: u8, byte6: u8) -> Vec<u8> {
        vec![0x02, b'S', b'F', 0x30, 0x30, byte5, byte6, 0x03, 0x00]
    }

    #[rstest]
    #[case(0x00, 0x08, CardStatus::Empty)]
    #[case(0x01, 0x08, CardStatus::Empty)]
    #[case(0x01, 0x00, CardStatus::PreEmpty)]
    #[case(0x31, 0x30, CardStatus::PreEmpty)]
    #[case(0x00, 0x00, CardStatus::HasCard)]
    #[case(0x30, 0x30, CardStatus::HasCard)]
    #[case(0x02, 0xF7, CardStatus::HasCard)]
    fn test_status_bits(#[case] byte5: u8, #[case] byte6: u8, #[case] expected: CardStatus) {
        assert_eq!(parse_status(&response(byte5, byte6)).unwrap(), expected);
    }

    #[test]
    fn test_minimum_length_accepted() {
        let exact = [0x02, b'S', b'F', 0x00, 0x00, 0x00, 0x00];
        assert_eq!(parse_status(&exact).unwrap(), CardStatus::HasCard);
    }

    #[rstest]
    #[case(&[])]
    #[case(&[0x02, b'S', b'F'])]
    #[case(&[0x02, b'S', b'F', 0x00, 0x00, 0x00])]
    fn test_short_response_rejected(#[case] bytes: &[u8]) {
        assert!(matches!(
            parse_status(bytes),
            Err(Error::MalformedStatus { .. })
        ));
    }

    #[rstest]
    #[case(&[0x06, b'S', b'F', 0x00, 0x00, 0x00, 0x00])]
    #[case(&[0x02, b'S', b'E', 0x00, 0x00, 0x00, 0x00])]
    #[case(&[0x02, b'N', b'F', 0x00, 0x00, 0x00, 0x08])]
    fn test_wrong_prefix_rejected(#[case] bytes: &[u8]) {
        assert!(matches!(
            parse_status(bytes),
            Err(Error::MalformedStatus { .. })
        ));
    }

    #[test]
    fn test_is_complete() {
        assert!(!is_complete(&[]));
        assert!(!is_complete(&[0x02, b'S', b'F', 0x00]));
        assert!(!is_complete(&[0x02, b'S', b'F', 0x00, 0x03, 0x55]));
        assert!(is_complete(&response(0x00, 0x00)));
    }
}
