//! rtbridge CLI - Command-line interface
//!
//! Runs bridged beacon stations, emulates the radio unit and decodes
//! hardware headers.

mod commands;

use std::path::PathBuf;

use clap::Parser;
use rtbridge_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "rtbridge")]
#[command(about = "Real-time bridge between simulated stations and V2X hardware")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the trace log
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
}

// Not a tokio main: the scheduler drives its own reactor runtime.
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref()) {
        eprintln!("Trace log unavailable: {e}");
    }

    match commands::handle_command(cli.command) {
        Ok(()) => Ok(()),
        Err(e) if e.is_clean_termination() => {
            tracing::info!("Run ended: {}", e);
            Ok(())
        }
        Err(e) => {
            tracing::error!("{}", e);
            anyhow::bail!("{}", e.user_message())
        }
    }
}
