use std::path::{Path, PathBuf};
use std::time::Duration;

use savesync_core::config::savesync_root;

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// How often the watcher checks whether changed files have settled.
pub const SETTLE_CHECK_INTERVAL: Duration = Duration::from_millis(500);

pub fn run_dir(home: &Path) -> PathBuf {
    savesync_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_SOCKET)
}
