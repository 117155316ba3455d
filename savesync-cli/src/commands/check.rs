//! `savesync check <path>...` runs paths through the stability gate.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use savesync_core::{config, GateDecision, StabilityGate};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Absolute paths, or paths relative to the watch root.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

impl CheckArgs {
    /// Exits 1 if any path is rejected.
    pub fn run(self) -> Result<ExitCode> {
        let config = config::load().context("failed to load config")?;
        let gate = StabilityGate::from_config(&config).context("invalid container pattern")?;

        let mut all_accepted = true;
        for path in &self.paths {
            match gate.evaluate(path) {
                GateDecision::Accept(save_path) => {
                    println!("{} {}", "✓ sync".green().bold(), save_path);
                }
                GateDecision::Reject(reason) => {
                    all_accepted = false;
                    println!(
                        "{} {} ({})",
                        "✗ skip".red().bold(),
                        path.display(),
                        reason.to_string().dimmed()
                    );
                }
            }
        }

        Ok(if all_accepted {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}
