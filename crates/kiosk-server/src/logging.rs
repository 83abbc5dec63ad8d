//! Tracing setup.
//!
//! Events go to stdout and, when a log directory is given, to a daily
//! action log `ActionLog/YYYY-MM-DD.txt` opened in append mode. Lines in
//! the action log read `YYYY-MM-DD HH:MM:SS LEVEL message`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Local, NaiveDate};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::{self as fmt_layer, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directory under the log directory holding the daily files.
pub const ACTION_LOG_DIR: &str = "ActionLog";

/// Install the global subscriber.
///
/// `level` is an `EnvFilter` directive; if it does not parse, `RUST_LOG`
/// is used instead.
///
/// # Errors
///
/// Returns an error if neither filter parses or a subscriber is already
/// installed.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(level).or_else(|_| EnvFilter::try_from_default_env())?;

    let action_log = log_dir.map(|dir| {
        fmt_layer::layer()
            .with_ansi(false)
            .with_target(false)
            .with_timer(LocalSeconds)
            .with_writer(ActionLog::new(dir))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer::layer().with_target(true))
        .with(action_log)
        .try_init()?;
    Ok(())
}

/// Local wall-clock time to the second.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSeconds;

impl FormatTime for LocalSeconds {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Writer factory for the daily action log.
///
/// Each event opens today's file in append mode, so the file rolls over
/// at midnight without a background task. If the file cannot be opened
/// the event is dropped and the failure is reported on stderr once.
#[derive(Debug)]
pub struct ActionLog {
    dir: PathBuf,
    reported: AtomicBool,
}

impl ActionLog {
    pub fn new(log_dir: &Path) -> Self {
        Self {
            dir: log_dir.join(ACTION_LOG_DIR),
            reported: AtomicBool::new(false),
        }
    }

    /// Path of the file for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.txt", date.format("%Y-%m-%d")))
    }

    fn open_today(&self) -> io::Result<File> {
        fs::create_dir_all(&self.dir)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(Local::now().date_naive()))
    }
}

impl<'a> MakeWriter<'a> for ActionLog {
    type Writer = ActionLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        match self.open_today() {
            Ok(file) => ActionLogWriter::File(file),
            Err(e) => {
                if !self.reported.swap(true, Ordering::Relaxed) {
                    eprintln!(
                        "action log unavailable in {}: {}",
                        self.dir.display(),
                        e
                    );
                }
                ActionLogWriter::Discard
            }
        }
    }
}

/// Writer for a single event.
#[derive(Debug)]
pub enum ActionLogWriter {
    File(File),
    Discard,
}

impl Write for ActionLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ActionLogWriter::File(file) => file.write(buf),
            ActionLogWriter::Discard => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ActionLogWriter::File(file) => file.flush(),
            ActionLogWriter::Discard => Ok(()),
        }
    }
}
