use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use kiosk_terminal::{FileSettings, SettingsSource, SystemDevices, Terminal};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kiosk-server")]
#[command(about = "HTTP controller for a card-dispensing terminal", long_about = None)]
struct Cli {
    /// Directory holding terminal.conf and the legacy port files
    #[arg(short, long, default_value = ".")]
    config_dir: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Log level (trace, debug, info, warn, error) or a filter directive
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Directory for the daily action log; disabled when omitted
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = kiosk_server::logging::init_logging(&cli.log_level, cli.log_dir.as_deref()) {
        eprintln!("failed to initialise logging: {e:#}");
    }

    let settings = FileSettings::new(&cli.config_dir);
    match settings.load() {
        Ok(current) => info!(
            config_dir = %cli.config_dir.display(),
            crt_port = %current.crt_port,
            rfid_mode = ?current.rfid_mode,
            "Terminal settings loaded"
        ),
        // Settings are re-read per request, so a broken file can still be fixed live.
        Err(e) => warn!(config_dir = %cli.config_dir.display(), error = %e, "Terminal settings invalid"),
    }

    let terminal = Terminal::new(settings, SystemDevices);
    kiosk_server::serve(cli.bind, terminal)
        .await
        .context("kiosk server exited with an error")
}
