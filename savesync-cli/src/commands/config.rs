//! `savesync config`

use anyhow::{Context, Result};
use tabled::{settings::Style, Table, Tabled};

use savesync_core::{config, Config};

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "KEY")]
    key: &'static str,
    #[tabled(rename = "VALUE")]
    value: String,
}

fn rows(config: &Config) -> Vec<Row> {
    let row = |key, value: String| Row { key, value };
    vec![
        row("watch_root", config.watch_root.display().to_string()),
        row("remote", config.remote.clone()),
        row("branch", config.branch.clone()),
        row("debounce_ms", config.debounce_ms.to_string()),
        row("max_retries", config.max_retries.to_string()),
        row("retry_delay_ms", config.retry_delay_ms.to_string()),
        row("lock_wait_ms", config.lock_wait_ms.to_string()),
        row("lock_poll_ms", config.lock_poll_ms.to_string()),
        row("poll_interval_ms", config.poll_interval_ms.to_string()),
        row("stability_ms", config.stability_ms.to_string()),
        row("shutdown_grace_ms", config.shutdown_grace_ms.to_string()),
        row("probe_url", config.probe_url.clone()),
        row("probe_timeout_ms", config.probe_timeout_ms.to_string()),
        row("container_pattern", config.container_pattern.clone()),
        row("extensions", config.extensions.join(", ")),
        row("commit_prefix", config.commit_prefix.clone()),
        row("log_format", format!("{:?}", config.log_format).to_lowercase()),
    ]
}

pub fn run() -> Result<()> {
    let home = config::home()?;
    let config = config::load_at(&home).context("failed to load config")?;

    let mut table = Table::new(rows(&config));
    table.with(Style::rounded());
    println!("{table}");
    println!("source: {}", config::config_path_at(&home).display());
    Ok(())
}
