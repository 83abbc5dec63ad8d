//! Terminal settings and where they come from.
//!
//! Settings are reloaded on every stage and status request, so an operator
//! can edit the files without restarting the service. [`FileSettings`]
//! layers three sources:
//!
//! 1. Built-in defaults
//! 2. The single-value files `crt_port.txt` and `rfid_port.txt`
//! 3. `terminal.conf`, one `key=value` per line, `#` starts a comment
//!
//! ```text
//! # terminal.conf
//! crt_port = COM7
//! rfid_mode = pcsc
//! pcsc_reader_hint = ACR122
//! confirm_timeout_sec = 45
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kiosk_core::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_CONFIRM_TIMEOUT_SECONDS, DEFAULT_DISPENSE_RETRACT_DELAY_MS,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_RFID_IDLE_GAP_MS, DEFAULT_RFID_INITIAL_WINDOW_MS,
    DEFAULT_RFID_READ_TIMEOUT_MS, DEFAULT_STAGE_ATTEMPTS, DEFAULT_WRITE_TIMEOUT_MS,
    MAX_STAGE_ATTEMPTS,
};
use kiosk_core::{Error, Result};
use kiosk_hardware::{CrtTimings, SerialSettings};
use kiosk_rfid::BurstTimings;

/// Legacy file holding only the dispenser port name.
pub const CRT_PORT_FILE: &str = "crt_port.txt";

/// Legacy file holding only the RFID sensor port name.
pub const RFID_PORT_FILE: &str = "rfid_port.txt";

/// Main settings file.
pub const CONFIG_FILE: &str = "terminal.conf";

#[cfg(windows)]
const DEFAULT_CRT_PORT: &str = "COM5";
#[cfg(not(windows))]
const DEFAULT_CRT_PORT: &str = "/dev/ttyUSB0";

#[cfg(windows)]
const DEFAULT_RFID_PORT: &str = "COM4";
#[cfg(not(windows))]
const DEFAULT_RFID_PORT: &str = "/dev/ttyUSB1";

/// Which identifier reads the staged card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RfidMode {
    /// Serial sensor emitting text bursts.
    #[default]
    Serial,
    /// PC/SC smart-card reader.
    Pcsc,
}

impl FromStr for RfidMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(RfidMode::Serial),
            "pcsc" => Ok(RfidMode::Pcsc),
            other => Err(Error::Config(format!(
                "rfid_mode must be serial or pcsc, got {other:?}"
            ))),
        }
    }
}

/// Snapshot of everything a lifecycle needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalSettings {
    /// Dispenser serial port.
    pub crt_port: String,
    /// RFID sensor serial port (serial mode only).
    pub rfid_port: String,
    /// Baud rate of both serial lines.
    pub baud_rate: u32,
    /// Serial read timeout, also the ACK wait.
    pub serial_read_timeout: Duration,
    /// Serial write timeout.
    pub serial_write_timeout: Duration,
    /// Identifier in use.
    pub rfid_mode: RfidMode,
    /// Identification window per attempt.
    pub rfid_read_timeout: Duration,
    /// Minimum burst collection time after the first chunk.
    pub rfid_initial_window: Duration,
    /// Quiet period that ends a burst.
    pub rfid_idle_gap: Duration,
    /// Preferred smart-card reader name fragment (pcsc mode only).
    pub pcsc_reader_hint: Option<String>,
    /// How long a staged card waits for confirm/deny.
    pub confirm_timeout: Duration,
    /// Delay between a dispense and the safety retract.
    pub dispense_retract_delay: Duration,
    /// Positioning attempts per stage request.
    pub stage_attempts: u32,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            crt_port: DEFAULT_CRT_PORT.to_string(),
            rfid_port: DEFAULT_RFID_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            serial_read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            serial_write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            rfid_mode: RfidMode::default(),
            rfid_read_timeout: Duration::from_millis(DEFAULT_RFID_READ_TIMEOUT_MS),
            rfid_initial_window: Duration::from_millis(DEFAULT_RFID_INITIAL_WINDOW_MS),
            rfid_idle_gap: Duration::from_millis(DEFAULT_RFID_IDLE_GAP_MS),
            pcsc_reader_hint: None,
            confirm_timeout: Duration::from_secs(DEFAULT_CONFIRM_TIMEOUT_SECONDS),
            dispense_retract_delay: Duration::from_millis(DEFAULT_DISPENSE_RETRACT_DELAY_MS),
            stage_attempts: DEFAULT_STAGE_ATTEMPTS,
        }
    }
}

impl TerminalSettings {
    /// Serial parameters of the dispenser line.
    pub fn crt_serial(&self) -> SerialSettings {
        SerialSettings::new(&self.crt_port)
            .with_baud_rate(self.baud_rate)
            .with_timeouts(self.serial_read_timeout, self.serial_write_timeout)
    }

    /// Serial parameters of the RFID sensor line.
    pub fn rfid_serial(&self) -> SerialSettings {
        SerialSettings::new(&self.rfid_port)
            .with_baud_rate(self.baud_rate)
            .with_timeouts(self.serial_read_timeout, self.serial_write_timeout)
    }

    /// Handshake timings of the dispenser driver.
    pub fn crt_timings(&self) -> CrtTimings {
        CrtTimings::for_read_timeout(self.serial_read_timeout)
    }

    /// Burst timings of the serial RFID sensor.
    pub fn burst_timings(&self) -> BurstTimings {
        BurstTimings {
            initial_window: self.rfid_initial_window,
            idle_gap: self.rfid_idle_gap,
        }
    }

    /// Apply one `key=value` setting.
    ///
    /// Returns `Ok(false)` for keys this version does not know.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the value cannot be parsed.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<bool> {
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "crt_port" => self.crt_port = non_empty(key, value)?,
            "rfid_port" => self.rfid_port = non_empty(key, value)?,
            "baud_rate" => self.baud_rate = number(key, value)?,
            "serial_read_timeout_ms" => self.serial_read_timeout = millis(key, value)?,
            "serial_write_timeout_ms" => self.serial_write_timeout = millis(key, value)?,
            "rfid_mode" => self.rfid_mode = value.parse()?,
            "rfid_read_timeout_ms" => self.rfid_read_timeout = millis(key, value)?,
            "rfid_initial_window_ms" => self.rfid_initial_window = millis(key, value)?,
            "rfid_idle_gap_ms" => self.rfid_idle_gap = millis(key, value)?,
            "pcsc_reader_hint" => {
                self.pcsc_reader_hint = (!value.is_empty()).then(|| value.to_string());
            }
            "confirm_timeout_sec" => {
                self.confirm_timeout = Duration::from_secs(number(key, value)?);
            }
            "dispense_retract_delay_ms" => self.dispense_retract_delay = millis(key, value)?,
            "stage_attempts" => self.stage_attempts = number(key, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Apply every setting of a `terminal.conf` text.
    ///
    /// Blank lines and `#` comments are skipped. Unknown keys are logged and
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for lines without `=` and for bad values,
    /// naming the line.
    pub fn apply_text(&mut self, text: &str) -> Result<()> {
        for (index, line) in text.lines().enumerate() {
            let line = strip_comment(line).trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::Config(format!(
                    "line {}: expected key=value, got {line:?}",
                    index + 1
                )));
            };

            let known = self
                .apply(key, value)
                .map_err(|e| Error::Config(format!("line {}: {}", index + 1, config_message(e))))?;
            if !known {
                warn!(key = key.trim(), line = index + 1, "Ignoring unknown setting");
            }
        }
        Ok(())
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(Error::Config("baud_rate must be positive".into()));
        }
        if self.serial_read_timeout.is_zero() || self.serial_write_timeout.is_zero() {
            return Err(Error::Config("serial timeouts must be positive".into()));
        }
        if self.rfid_read_timeout.is_zero() {
            return Err(Error::Config("rfid_read_timeout_ms must be positive".into()));
        }
        if self.confirm_timeout.is_zero() {
            return Err(Error::Config("confirm_timeout_sec must be positive".into()));
        }
        if !(1..=MAX_STAGE_ATTEMPTS).contains(&self.stage_attempts) {
            return Err(Error::Config(format!(
                "stage_attempts must be between 1 and {MAX_STAGE_ATTEMPTS}"
            )));
        }
        Ok(())
    }
}

/// Source of settings, consulted once per stage or status request.
pub trait SettingsSource: Send + Sync {
    /// Load a fresh settings snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the settings are unreadable or invalid.
    fn load(&self) -> Result<TerminalSettings>;
}

/// Settings read from a configuration directory.
#[derive(Debug, Clone)]
pub struct FileSettings {
    dir: PathBuf,
}

impl FileSettings {
    /// Read settings from files in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Configuration directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_optional(&self, name: &str) -> Result<Option<String>> {
        let path = self.dir.join(name);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Config(format!("{}: {e}", path.display()))),
        }
    }

    fn read_port_file(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .read_optional(name)?
            .map(|text| text.trim().to_string())
            .filter(|port| !port.is_empty()))
    }
}

impl SettingsSource for FileSettings {
    fn load(&self) -> Result<TerminalSettings> {
        let mut settings = TerminalSettings::default();

        if let Some(port) = self.read_port_file(CRT_PORT_FILE)? {
            settings.crt_port = port;
        }
        if let Some(port) = self.read_port_file(RFID_PORT_FILE)? {
            settings.rfid_port = port;
        }
        if let Some(text) = self.read_optional(CONFIG_FILE)? {
            settings.apply_text(&text).map_err(|e| {
                Error::Config(format!("{}: {}", CONFIG_FILE, config_message(e)))
            })?;
        }

        settings.validate()?;
        debug!(
            crt_port = %settings.crt_port,
            rfid_mode = ?settings.rfid_mode,
            "Settings loaded"
        );
        Ok(settings)
    }
}

/// Fixed settings snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub TerminalSettings);

impl SettingsSource for StaticSettings {
    fn load(&self) -> Result<TerminalSettings> {
        self.0.validate()?;
        Ok(self.0.clone())
    }
}

fn strip_comment(line: &str) -> &str {
    line.split_once('#').map_or(line, |(before, _)| before)
}

fn config_message(error: Error) -> String {
    match error {
        Error::Config(message) => message,
        other => other.to_string(),
    }
}

fn non_empty(key: &str, value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(Error::Config(format!("{} must not be empty", key.trim())));
    }
    Ok(value.to_string())
}

fn number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got {value:?}", key.trim())))
}

fn millis(key: &str, value: &str) -> Result<Duration> {
    number(key, value).map(Duration::from_millis)
}
