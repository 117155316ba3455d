//! `savesync daemon`: foreground run and control-socket requests.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Subcommand;

use savesync_core::config;
use savesync_daemon::paths::socket_path;
use savesync_daemon::{request_flush, request_status, request_stop, start_blocking, DaemonError};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground until SIGINT/SIGTERM or `daemon stop`.
    Start,
    /// Request a graceful shutdown (final flush, then exit).
    Stop,
    /// Print the daemon's queue and publish state.
    Status,
    /// Publish the pending queue now instead of waiting for the debounce.
    Flush,
}

pub fn run(command: DaemonCommand) -> Result<ExitCode> {
    let home = config::home()?;

    match command {
        DaemonCommand::Start => {
            return match start_blocking(&home) {
                Ok(outcome) => Ok(ExitCode::from(outcome.exit_code())),
                Err(err) => {
                    eprintln!("savesync: {err}");
                    Ok(ExitCode::FAILURE)
                }
            };
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Flush => match request_flush(&home) {
            Ok(data) => println!(
                "{}",
                serde_json::to_string_pretty(&data).context("failed to render flush response")?
            ),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
                return Ok(ExitCode::FAILURE);
            }
            Err(err) => return Err(err).context("failed to request flush"),
        },
    }

    Ok(ExitCode::SUCCESS)
}
