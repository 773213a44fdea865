//! `mpy` entry point.
//!
//! ```text
//! mpy ls                          List the board filesystem
//! mpy --address host:port cat f   Use a TCP serial bridge
//! mpy --config <path> ...         Use custom config TOML
//! mpy --gen-config                Dump default config and exit
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mpy_cli::commands::{self, Command};
use mpy_cli::config::CliConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mpy", version, about = "Drive a MicroPython board over its raw REPL")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mpy.toml")]
    config: PathBuf,

    /// TCP serial bridge address (overrides config). Example: 192.168.4.1:23
    #[arg(short, long, conflicts_with = "path")]
    address: Option<String>,

    /// Serial device path (overrides config). Example: /dev/ttyACM0
    #[arg(short, long)]
    path: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&CliConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = CliConfig::load(&cli.config);
    if let Some(address) = cli.address {
        config.use_address(address);
    }
    if let Some(path) = cli.path {
        config.use_path(path);
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = cli.command else {
        return Err("no subcommand given; see --help".into());
    };

    let mut device = config.device()?;
    device.connect().await?;
    info!("mpy v{}", env!("CARGO_PKG_VERSION"));

    let mut stdout = std::io::stdout().lock();
    let result = commands::execute(&device, command, &mut stdout).await;

    if let Err(e) = device.disconnect().await {
        warn!("disconnect failed: {e}");
    }
    result
}
