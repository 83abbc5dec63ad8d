//! Serial RFID sensor that emits one text burst per card.
//!
//! The sensor prints something like `HID[26bit] 0123 045678\r\n` when a card
//! enters its field, sometimes split over several chunks, and `No Card` when
//! the field is empty. A burst is over once the line has been quiet for the
//! idle gap and the initial window since the first chunk has passed.

use crate::traits::CardIdentifier;
use kiosk_core::Identification;
use kiosk_core::constants::{
    DEFAULT_RFID_IDLE_GAP_MS, DEFAULT_RFID_INITIAL_WINDOW_MS, NO_CARD_SENTINEL,
};
use kiosk_hardware::{AnyLink, Result, SerialLink};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Shortest read the collector issues, so a loop never spins.
const MIN_READ: Duration = Duration::from_millis(1);

/// Burst collection timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstTimings {
    /// Minimum collection time after the first chunk.
    pub initial_window: Duration,

    /// Quiet period that ends a burst.
    pub idle_gap: Duration,
}

impl Default for BurstTimings {
    fn default() -> Self {
        Self {
            initial_window: Duration::from_millis(DEFAULT_RFID_INITIAL_WINDOW_MS),
            idle_gap: Duration::from_millis(DEFAULT_RFID_IDLE_GAP_MS),
        }
    }
}

/// Identifier backed by a serial RFID sensor.
#[derive(Debug)]
pub struct SerialBurstReader<L: SerialLink = AnyLink> {
    link: L,
    timings: BurstTimings,
}

impl<L: SerialLink> SerialBurstReader<L> {
    /// Create a reader with the default burst timings.
    pub fn new(link: L) -> Self {
        Self::with_timings(link, BurstTimings::default())
    }

    /// Create a reader with explicit burst timings.
    pub fn with_timings(link: L, timings: BurstTimings) -> Self {
        Self { link, timings }
    }

    /// Collect one burst of bytes, or nothing if the line stays quiet for
    /// the whole window.
    ///
    /// # Errors
    ///
    /// Returns an error if the port fails.
    pub fn collect_burst(&mut self, window: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + window;
        let mut burst = Vec::new();

        // Wait for the first chunk.
        let first_at = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(burst);
            }
            let chunk = self.link.read_chunk(remaining)?;
            if !chunk.is_empty() {
                burst.extend_from_slice(&chunk);
                break Instant::now();
            }
        };

        let mut last_data = first_at;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let need_idle = self.timings.idle_gap.saturating_sub(now - last_data);
            let need_window = self.timings.initial_window.saturating_sub(now - first_at);
            if need_idle.is_zero() && need_window.is_zero() {
                break;
            }

            let wait = need_idle
                .max(need_window)
                .min(deadline - now)
                .max(MIN_READ);
            let chunk = self.link.read_chunk(wait)?;
            if !chunk.is_empty() {
                burst.extend_from_slice(&chunk);
                last_data = Instant::now();
            }
        }

        Ok(burst)
    }
}

impl<L: SerialLink> CardIdentifier for SerialBurstReader<L> {
    fn name(&self) -> &str {
        self.link.name()
    }

    fn prepare(&mut self) -> Result<()> {
        self.link.clear_input()
    }

    fn identify(&mut self, window: Duration) -> Result<Option<Identification>> {
        let burst = self.collect_burst(window)?;
        if burst.is_empty() {
            info!(port = %self.link.name(), "No RFID data within window");
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&burst);
        debug!(port = %self.link.name(), burst = %text.trim(), "RFID burst");

        match parse_burst(&text) {
            Some(token) => {
                info!(port = %self.link.name(), uid = %token, "Card identified");
                Ok(Some(Identification::token(token)))
            }
            None => {
                info!(port = %self.link.name(), "RFID burst carried no card number");
                Ok(None)
            }
        }
    }
}

/// Extract the card token from a sensor burst.
///
/// Line breaks become spaces, a `No Card` report yields `None`, bracketed
/// tags such as `[26bit]` are dropped and the last run of ASCII digits is the
/// token.
///
/// # Examples
///
/// ```
/// use kiosk_rfid::parse_burst;
///
/// assert_eq!(parse_burst("HID[26bit] 0123 045678\r\n").as_deref(), Some("045678"));
/// assert_eq!(parse_burst("No Card"), None);
/// ```
pub fn parse_burst(text: &str) -> Option<String> {
    let normalized = text.replace(['\r', '\n'], " ");
    let normalized = normalized.trim();
    if normalized.is_empty() || normalized.to_lowercase().contains(NO_CARD_SENTINEL) {
        return None;
    }

    let untagged = strip_tags(normalized);
    last_digit_run(&untagged).map(str::to_string)
}

/// Remove `[...]` segments. An unclosed bracket swallows the rest.
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '[' => in_tag = true,
            ']' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn last_digit_run(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let end = bytes.iter().rposition(u8::is_ascii_digit)? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |i| i + 1);
    Some(&text[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_core::IdentifierKind;
    use kiosk_hardware::mock::{MockLink, MockLinkHandle};
    use rstest::rstest;

    #[rstest]
    #[case("HID[26bit] 0123 045678", Some("045678"))]
    #[case("HID[26bit] 0123 045678\r\n", Some("045678"))]
    #[case("0123\r\n045678\r\n", Some("045678"))]
    #[case("  987654  ", Some("987654"))]
    #[case("EM4100 ID:0012345678", Some("0012345678"))]
    #[case("UID 12ab34", Some("34"))]
    #[case("[123] 456", Some("456"))]
    #[case("HID[26bit]", None)]
    #[case("No Card", None)]
    #[case("NO CARD\r\n", None)]
    #[case("reader: no card 0123", None)]
    #[case("", None)]
    #[case("\r\n", None)]
    #[case("no digits here", None)]
    #[case("789 [unterminated 123", Some("789"))]
    fn test_parse_burst(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_burst(text).as_deref(), expected);
    }

    fn fast() -> BurstTimings {
        BurstTimings {
            initial_window: Duration::from_millis(40),
            idle_gap: Duration::from_millis(15),
        }
    }

    fn reader() -> (SerialBurstReader<MockLink>, MockLinkHandle) {
        let (link, handle) = MockLink::new("COM4");
        (SerialBurstReader::with_timings(link, fast()), handle)
    }

    #[test]
    fn test_identifies_split_burst() {
        let (mut reader, handle) = reader();
        handle.push_rx(b"HID[26bit] ");
        handle.push_silence(Duration::from_millis(5));
        handle.push_rx(b"0123 045678\r\n");

        let id = reader.identify(Duration::from_millis(500)).unwrap().unwrap();
        assert_eq!(id.identifier, "045678");
        assert_eq!(id.kind, IdentifierKind::Token);
        assert_eq!(id.facility, None);
    }

    #[test]
    fn test_initial_window_keeps_collecting_across_gaps() {
        let (mut reader, handle) = reader();
        handle.push_rx(b"0123 ");
        // Longer than the idle gap, still inside the initial window.
        handle.push_silence(Duration::from_millis(20));
        handle.push_rx(b"045678");

        let id = reader.identify(Duration::from_millis(500)).unwrap().unwrap();
        assert_eq!(id.identifier, "045678");
    }

    #[test]
    fn test_burst_ends_after_idle_gap() {
        let (mut reader, handle) = reader();
        handle.push_rx(b"111111");
        handle.push_silence(Duration::from_millis(200));
        handle.push_rx(b" 222222");

        let burst = reader.collect_burst(Duration::from_millis(1000)).unwrap();
        assert_eq!(burst, b"111111".to_vec());
    }

    #[test]
    fn test_quiet_line_yields_none() {
        let (mut reader, _handle) = reader();
        let started = Instant::now();

        assert!(reader.identify(Duration::from_millis(30)).unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_no_card_report_yields_none() {
        let (mut reader, handle) = reader();
        handle.push_rx(b"No Card\r\n");

        assert!(reader.identify(Duration::from_millis(200)).unwrap().is_none());
    }

    #[test]
    fn test_prepare_discards_stale_input() {
        let (mut reader, handle) = reader();
        handle.push_rx(b"000111");
        handle.deliver_after_clear(&[b"HID[26bit] 0123 045678"]);

        reader.prepare().unwrap();
        let id = reader.identify(Duration::from_millis(200)).unwrap().unwrap();
        assert_eq!(id.identifier, "045678");
        assert_eq!(handle.clears(), 1);
    }

    #[test]
    fn test_window_bounds_collection() {
        let (link, handle) = MockLink::new("COM4");
        let mut reader = SerialBurstReader::with_timings(
            link,
            BurstTimings {
                initial_window: Duration::from_secs(10),
                idle_gap: Duration::from_millis(15),
            },
        );
        handle.push_rx(b"42");
        let started = Instant::now();

        let burst = reader.collect_burst(Duration::from_millis(60)).unwrap();
        assert_eq!(burst, b"42".to_vec());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
