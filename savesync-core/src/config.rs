//! YAML configuration for the savesync daemon.
//!
//! # Storage layout
//!
//! ```text
//! ~/.savesync/
//!   config.yaml      (mode 0600, written by `savesync init`)
//!   run/daemon.sock  (control socket while the daemon runs)
//! ```
//!
//! # API pattern
//!
//! Every function touching the filesystem has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CONTAINER_PATTERN: &str = r"^[A-Z]{2}[A-Z]{2}\d{5}[A-Z0-9]*$";
pub const DEFAULT_PROBE_URL: &str = "https://www.google.com";

/// Output format of the daemon's log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Daemon configuration. Every key except `watch_root` has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory tree being watched. Also the git working tree.
    pub watch_root: PathBuf,
    pub remote: String,
    pub branch: String,

    /// Quiet period before a batch is flushed.
    pub debounce_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,

    /// Upper bound on waiting for another process to release a file.
    pub lock_wait_ms: u64,
    pub lock_poll_ms: u64,

    /// Watcher poll interval.
    pub poll_interval_ms: u64,
    /// How long a file's size and mtime must stay unchanged before it is reported.
    pub stability_ms: u64,
    pub shutdown_grace_ms: u64,

    pub probe_url: String,
    pub probe_timeout_ms: u64,

    /// Case-insensitive pattern for the top-level save container directory.
    pub container_pattern: String,
    /// Allowed file extensions, without the leading dot.
    pub extensions: Vec<String>,
    pub commit_prefix: String,

    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_root: PathBuf::new(),
            remote: "origin".to_string(),
            branch: "main".to_string(),
            debounce_ms: 5_000,
            max_retries: 3,
            retry_delay_ms: 2_000,
            lock_wait_ms: 10_000,
            lock_poll_ms: 500,
            poll_interval_ms: 3_000,
            stability_ms: 5_000,
            shutdown_grace_ms: 10_000,
            probe_url: DEFAULT_PROBE_URL.to_string(),
            probe_timeout_ms: 10_000,
            container_pattern: DEFAULT_CONTAINER_PATTERN.to_string(),
            extensions: vec!["bin".to_string(), "png".to_string(), "sfo".to_string()],
            commit_prefix: "Update saves".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    pub fn new(watch_root: impl Into<PathBuf>) -> Self {
        Self {
            watch_root: watch_root.into(),
            ..Self::default()
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stability(&self) -> Duration {
        Duration::from_millis(self.stability_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.savesync/`
pub fn savesync_root(home: &Path) -> PathBuf {
    home.join(".savesync")
}

/// `<home>/.savesync/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    savesync_root(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load `<home>/.savesync/config.yaml`.
///
/// Returns `ConfigError::ConfigNotFound` if absent and `ConfigError::Parse`
/// (with path + line context) if malformed.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

/// Atomically save the config: serialize → `.yaml.tmp` → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    let root = savesync_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root)?;
        set_dir_permissions(&root)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Write a default config for `watch_root`.
///
/// Fails with `ConfigError::AlreadyExists` unless `force` is set.
pub fn init_at(home: &Path, config: Config, force: bool) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists { path });
    }
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(config: Config, force: bool) -> Result<Config, ConfigError> {
    init_at(&home()?, config, force)
}

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
