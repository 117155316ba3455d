//! `savesync init <watch_root> [--remote <name>] [--branch <name>] [--force]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use savesync_core::{config, Config};

/// Write the daemon configuration for a save directory.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Save directory to watch. Must already be a git working tree.
    pub watch_root: PathBuf,

    /// Git remote that receives pushes.
    #[arg(long, default_value = "origin")]
    pub remote: String,

    /// Branch pulled from and pushed to.
    #[arg(long, default_value = "main")]
    pub branch: String,

    /// Overwrite an existing config.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let watch_root = self
            .watch_root
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.watch_root.display()))?;
        if !watch_root.join(".git").exists() {
            eprintln!(
                "warning: '{}' is not a git working tree; publishing will fail until it is",
                watch_root.display()
            );
        }

        let mut config = Config::new(watch_root);
        config.remote = self.remote;
        config.branch = self.branch;

        let home = config::home()?;
        let config = config::init_at(&home, config, self.force)
            .context("failed to write config")?;

        println!("✓ Watching '{}'", config.watch_root.display());
        println!("  Pushing to {}/{}", config.remote, config.branch);
        println!("  Saved to: {}", config::config_path_at(&home).display());
        Ok(())
    }
}
