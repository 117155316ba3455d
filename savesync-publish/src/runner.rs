//! Command execution seam.
//!
//! Everything the pipeline asks of git goes through [`CommandRunner`], so tests
//! can script outcomes without a real repository or network.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{io_err, PublishError};

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandRunner: Send + Sync {
    /// Run `program args…` in `cwd`. A non-zero exit is an error.
    fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutput, PublishError>;
}

/// Runs commands as child processes. Arguments are passed as argv, never
/// through a shell, so file names and messages need no quoting.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutput, PublishError> {
        let command = render_command(program, args);
        tracing::info!("executing `{}` in {}", command, cwd.display());

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            // Never block on a credential prompt; fail and let the retry logic decide.
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| io_err(cwd, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            if !stdout.trim().is_empty() {
                tracing::error!("stdout (on error): {}", stdout.trim());
            }
            return Err(PublishError::CommandFailed { command, stderr });
        }

        if !stdout.trim().is_empty() {
            tracing::debug!("stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            if stderr.to_ascii_lowercase().contains("warning") {
                tracing::debug!("stderr (warning/info): {}", stderr.trim());
            } else {
                tracing::warn!("stderr (non-warning): {}", stderr.trim());
            }
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

pub(crate) fn render_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
