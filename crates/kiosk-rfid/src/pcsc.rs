//! Smart-card reader identification over PC/SC.
//!
//! The reader is polled with the pseudo-APDU `GET DATA (UID)` understood by
//! ACR122U, Omnikey and most PC/SC contactless readers:
//!
//! ```text
//! FF CA 00 00 00   UID, full length
//! FF CA 00 00 04   UID, first four bytes (readers that reject Le = 00)
//! ```
//!
//! Only responses ending in `90 00` with at least one data byte count.

use crate::traits::CardIdentifier;
use crate::wiegand::{Wiegand26, uid_hex};
use kiosk_core::Identification;
use kiosk_core::constants::PCSC_POLL_INTERVAL_MS;
use kiosk_hardware::{HardwareError, Result};
use pcsc::{Context, Protocols, Scope, ShareMode};
use std::ffi::CString;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// GET UID, full length.
pub const GET_UID: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];

/// GET UID, four bytes.
pub const GET_UID_SHORT: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x04];

/// Status word of a successful response.
const SW_SUCCESS: [u8; 2] = [0x90, 0x00];

/// Reader name fragments that indicate a contactless interface, in order of
/// preference.
const CONTACTLESS_HINTS: [&str; 6] = ["contactless", "picc", "acr122", "omnikey", "nfc", "hid"];

/// Identifier backed by a PC/SC smart-card reader.
#[derive(Debug, Clone)]
pub struct PcscIdentifier {
    reader_hint: Option<String>,
}

impl PcscIdentifier {
    /// Create an identifier that prefers readers whose name contains
    /// `reader_hint`.
    pub fn new(reader_hint: Option<String>) -> Self {
        Self {
            reader_hint: reader_hint.filter(|hint| !hint.trim().is_empty()),
        }
    }

    fn list_readers(context: &Context) -> Result<Vec<CString>> {
        let mut buf = [0u8; 2048];
        match context.list_readers(&mut buf) {
            Ok(names) => Ok(names.map(CString::from).collect()),
            Err(e) if no_reader(&e) => {
                debug!(error = %e, "Reader list unavailable");
                Ok(Vec::new())
            }
            Err(e) => Err(smart_card_error("list readers", e)),
        }
    }

    /// One pass over the ranked readers.
    fn poll_once(&self, context: &Context, readers: &[CString]) -> Option<Identification> {
        for reader in readers {
            let name = reader.to_string_lossy();
            let card = match context.connect(reader, ShareMode::Shared, Protocols::ANY) {
                Ok(card) => card,
                Err(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => continue,
                Err(e) => {
                    debug!(reader = %name, error = %e, "Connect failed");
                    continue;
                }
            };

            for apdu in [GET_UID, GET_UID_SHORT] {
                let mut rx = [0u8; pcsc::MAX_BUFFER_SIZE];
                match card.transmit(&apdu, &mut rx) {
                    Ok(response) => {
                        if let Some(uid) = uid_from_response(response) {
                            return Some(identification(uid, &name));
                        }
                        debug!(reader = %name, response = %uid_hex(response), "GET UID rejected");
                    }
                    Err(e) => debug!(reader = %name, error = %e, "Transmit failed"),
                }
            }
        }
        None
    }
}

impl Default for PcscIdentifier {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CardIdentifier for PcscIdentifier {
    fn name(&self) -> &str {
        self.reader_hint.as_deref().unwrap_or("pcsc")
    }

    fn identify(&mut self, window: Duration) -> Result<Option<Identification>> {
        let deadline = Instant::now() + window;
        let context = match Context::establish(Scope::User) {
            Ok(context) => context,
            Err(e) if no_reader(&e) => {
                warn!(error = %e, "Smart-card service unavailable, no reader attached");
                return Ok(None);
            }
            Err(e) => return Err(smart_card_error("establish context", e)),
        };

        let names = Self::list_readers(&context)?;
        if names.is_empty() {
            warn!("No smart-card readers available");
            return Ok(None);
        }

        let readers = rank_readers(names, self.reader_hint.as_deref());
        debug!(
            readers = ?readers.iter().map(|r| r.to_string_lossy()).collect::<Vec<_>>(),
            "Polling smart-card readers"
        );

        loop {
            if let Some(identification) = self.poll_once(&context, &readers) {
                info!(
                    reader = identification.reader.as_deref().unwrap_or_default(),
                    uid = %identification,
                    "Card identified"
                );
                return Ok(Some(identification));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                info!(window_ms = window.as_millis() as u64, "No card UID within window");
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(PCSC_POLL_INTERVAL_MS).min(remaining));
        }
    }
}

/// Order readers for polling: the configured hint first, then known
/// contactless interfaces, then the order the subsystem listed them in.
pub fn rank_readers(names: Vec<CString>, hint: Option<&str>) -> Vec<CString> {
    let hint = hint.map(str::to_lowercase);
    let mut ranked: Vec<(usize, usize, CString)> = names
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let lower = name.to_string_lossy().to_lowercase();
            let score = if hint.as_deref().is_some_and(|h| lower.contains(h)) {
                0
            } else {
                CONTACTLESS_HINTS
                    .iter()
                    .position(|fragment| lower.contains(fragment))
                    .map_or(CONTACTLESS_HINTS.len() + 1, |p| p + 1)
            };
            (score, index, name)
        })
        .collect();

    ranked.sort_by_key(|(score, index, _)| (*score, *index));
    ranked.into_iter().map(|(_, _, name)| name).collect()
}

/// Data bytes of a GET UID response, if it succeeded and carried any.
pub fn uid_from_response(response: &[u8]) -> Option<&[u8]> {
    let (data, status) = response.split_at_checked(response.len().checked_sub(2)?)?;
    (status == SW_SUCCESS && !data.is_empty()).then_some(data)
}

fn identification(uid: &[u8], reader: &str) -> Identification {
    let identification = Identification::hex_uid(uid_hex(uid)).with_reader(reader);
    match Wiegand26::decode(uid) {
        Some(wiegand) => identification.with_wiegand(wiegand.facility, wiegand.card_number),
        None => identification,
    }
}

/// Errors meaning no reader is attached.
///
/// Windows stops the smart-card service when the last reader is unplugged,
/// so a missing service reads the same as an empty reader list.
fn no_reader(error: &pcsc::Error) -> bool {
    matches!(
        error,
        pcsc::Error::NoReadersAvailable | pcsc::Error::NoService | pcsc::Error::ServiceStopped
    )
}

fn smart_card_error(action: &str, error: pcsc::Error) -> HardwareError {
    HardwareError::smart_card(format!("{action}: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_core::IdentifierKind;
    use rstest::rstest;

    fn names(list: &[&str]) -> Vec<CString> {
        list.iter().map(|n| CString::new(*n).unwrap()).collect()
    }

    fn ranked(list: &[&str], hint: Option<&str>) -> Vec<String> {
        rank_readers(names(list), hint)
            .into_iter()
            .map(|n| n.into_string().unwrap())
            .collect()
    }

    #[test]
    fn test_rank_prefers_contactless_interfaces() {
        let order = ranked(
            &[
                "Generic Smart Card Reader 0",
                "HID Global OMNIKEY 5427 CK 0",
                "ACS ACR122U PICC Interface 0",
            ],
            None,
        );
        assert_eq!(
            order,
            vec![
                "ACS ACR122U PICC Interface 0",
                "HID Global OMNIKEY 5427 CK 0",
                "Generic Smart Card Reader 0",
            ]
        );
    }

    #[test]
    fn test_rank_hint_wins() {
        let order = ranked(
            &["ACS ACR122U PICC Interface 0", "Identiv uTrust 3700 F 0"],
            Some("UTRUST"),
        );
        assert_eq!(order[0], "Identiv uTrust 3700 F 0");
    }

    #[test]
    fn test_rank_keeps_list_order_for_ties() {
        let order = ranked(&["Reader B", "Reader A", "Reader C"], None);
        assert_eq!(order, vec!["Reader B", "Reader A", "Reader C"]);
    }

    #[test]
    fn test_rank_contactless_before_plain_nfc() {
        let order = ranked(&["NFC Reader", "Contactless Reader"], None);
        assert_eq!(order, vec!["Contactless Reader", "NFC Reader"]);
    }

    #[test]
    fn test_uid_from_response() {
        assert_eq!(
            uid_from_response(&[0x04, 0xAA, 0xBB, 0xCC, 0x90, 0x00]),
            Some(&[0x04, 0xAA, 0xBB, 0xCC][..])
        );
        assert_eq!(uid_from_response(&[0x90, 0x00]), None);
        assert_eq!(uid_from_response(&[0x63, 0x00]), None);
        assert_eq!(uid_from_response(&[0x04, 0x6A, 0x81]), None);
        assert_eq!(uid_from_response(&[0x00]), None);
        assert_eq!(uid_from_response(&[]), None);
    }

    #[test]
    fn test_identification_from_long_uid() {
        let id = identification(&[0xAB, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC], "ACR122U");
        assert_eq!(id.identifier, "AB123456789ABC");
        assert_eq!(id.kind, IdentifierKind::HexUid);
        assert_eq!(id.facility, Some(86));
        assert_eq!(id.card_number, Some(9320));
        assert_eq!(id.reader.as_deref(), Some("ACR122U"));
    }

    #[test]
    fn test_identification_from_short_uid() {
        let id = identification(&[0x01, 0x02, 0x03], "ACR122U");
        assert_eq!(id.identifier, "010203");
        assert_eq!(id.facility, None);
        assert_eq!(id.card_number, None);
    }

    #[rstest]
    #[case(pcsc::Error::NoReadersAvailable, true)]
    #[case(pcsc::Error::NoService, true)]
    #[case(pcsc::Error::ServiceStopped, true)]
    #[case(pcsc::Error::NoSmartcard, false)]
    #[case(pcsc::Error::InvalidHandle, false)]
    #[case(pcsc::Error::NoMemory, false)]
    #[case(pcsc::Error::InternalError, false)]
    fn test_missing_service_counts_as_no_reader(#[case] error: pcsc::Error, #[case] expected: bool) {
        assert_eq!(no_reader(&error), expected);
    }

    #[test]
    fn test_blank_hint_ignored() {
        let identifier = PcscIdentifier::new(Some("  ".to_string()));
        assert_eq!(identifier.name(), "pcsc");
    }
}
