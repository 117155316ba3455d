//! File readiness checks run just before staging.

use std::io::ErrorKind;
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// `true` if `path` exists and is a regular file.
pub fn is_present(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Poll until `path` can be opened for read+write, or `max_wait` elapses.
///
/// Returns `false` if the file may still be held by another process. Callers
/// proceed either way; the wait is a courtesy to the emulator, never a gate.
pub fn wait_for_release(path: &Path, max_wait: Duration, poll: Duration) -> bool {
    let started = Instant::now();
    loop {
        match std::fs::OpenOptions::new().read(true).write(true).open(path) {
            Ok(_) => return true,
            Err(err) if is_transient(&err) => {}
            // Anything else (permissions, etc.) will not clear by waiting.
            Err(_) => return true,
        }
        if started.elapsed() + poll > max_wait {
            tracing::warn!("file may still be locked: {}", path.display());
            return false;
        }
        sleep(poll);
    }
}

/// Busy, or briefly missing while the writer swaps the file into place.
fn is_transient(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::NotFound || is_busy(err)
}

#[cfg(unix)]
fn is_busy(err: &std::io::Error) -> bool {
    // EBUSY
    err.raw_os_error() == Some(16)
}

#[cfg(not(unix))]
fn is_busy(_err: &std::io::Error) -> bool {
    false
}
