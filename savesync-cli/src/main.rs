//! savesync: mirror a console save directory into a git remote.
//!
//! # Usage
//!
//! ```text
//! savesync init <watch_root> [--remote <name>] [--branch <name>] [--force]
//! savesync config
//! savesync check <path>...
//! savesync daemon start|stop|status|flush
//! ```

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, daemon::DaemonCommand, init::InitArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "savesync",
    version,
    about = "Watch a save directory and publish stable saves to a git remote",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write ~/.savesync/config.yaml for a save directory.
    Init(InitArgs),

    /// Print the effective configuration.
    Config,

    /// Show whether paths would be synchronized.
    Check(CheckArgs),

    /// Run or control the sync daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run().map(|()| ExitCode::SUCCESS),
        Commands::Config => commands::config::run().map(|()| ExitCode::SUCCESS),
        Commands::Check(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
