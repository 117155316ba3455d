//! Publish pipeline: one batch of save files → one commit on the remote.
//!
//! ## `Pipeline::publish` — step protocol
//!
//! 1. Remove a stale `.git/index.lock` (best-effort).
//! 2. `git pull` (failure tolerated; local saves win over remote drift).
//! 3. Drop paths whose files vanished; wait (bounded) for the rest to be released.
//! 4. Nothing left → [`PublishOutcome::NothingToPublish`].
//! 5. `git add` each file; a failing file is skipped.
//! 6. If `git status --porcelain` is clean, `git add -f` each file anyway.
//! 7. `git commit --allow-empty` so every flush leaves a commit.
//! 8. `git push`.
//!
//! Only steps 7 and 8 can fail the attempt. Single-flight and retries are the
//! caller's concern.

use std::time::Duration;

use chrono::{DateTime, Local};
use savesync_core::{Config, SavePath};

use crate::error::PublishError;
use crate::files;
use crate::repo::Repository;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum PublishOutcome {
    /// Committed and pushed.
    Published {
        files: Vec<SavePath>,
        message: String,
    },
    /// Every file vanished before staging; nothing was committed. Not a failure.
    NothingToPublish { dropped: Vec<SavePath> },
    /// Commit or push failed.
    Failed { error: PublishError },
}

/// Anything that can publish a batch. The daemon engine only sees this trait.
pub trait Publisher: Send + Sync {
    fn publish(&self, batch: &[SavePath]) -> PublishOutcome;
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub lock_wait: Duration,
    pub lock_poll: Duration,
    pub commit_prefix: String,
}

impl PublishOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lock_wait: config.lock_wait(),
            lock_poll: config.lock_poll(),
            commit_prefix: config.commit_prefix.clone(),
        }
    }
}

pub struct Pipeline {
    repo: Repository,
    options: PublishOptions,
}

impl Pipeline {
    pub fn new(repo: Repository, options: PublishOptions) -> Self {
        Self { repo, options }
    }

    fn preflight(&self) {
        tracing::info!("performing lightweight git cleanup");
        match self.repo.remove_stale_index_lock() {
            Ok(true) => tracing::info!("removed stale git index lock"),
            Ok(false) => {}
            Err(err) => tracing::error!("failed to remove git index lock: {}", err),
        }
        match self.repo.pull() {
            Ok(_) => tracing::info!("updated from remote"),
            Err(err) => tracing::warn!("pull failed, publishing anyway: {}", err),
        }
    }

    /// Files from `batch` that still exist, after waiting for each to be released.
    fn ready_files(&self, batch: &[SavePath]) -> Vec<SavePath> {
        let mut ready = Vec::with_capacity(batch.len());
        for path in batch {
            let full = path.to_path(self.repo.root());
            if !files::is_present(&full) {
                tracing::info!("file not found, skipping: {}", path);
                continue;
            }
            files::wait_for_release(&full, self.options.lock_wait, self.options.lock_poll);
            ready.push(path.clone());
        }
        ready
    }

    fn stage(&self, files: &[SavePath]) {
        for path in files {
            tracing::info!("adding: {}", path);
            if let Err(err) = self.repo.add(path) {
                tracing::warn!("failed to add {}: {}", path, err);
            }
        }

        match self.repo.is_clean() {
            Ok(true) => {
                tracing::info!("git reports no changes, forcing commit anyway");
                for path in files {
                    if let Err(err) = self.repo.force_add(path) {
                        tracing::warn!("failed to force-add {}: {}", path, err);
                    }
                }
            }
            Ok(false) => {}
            Err(err) => tracing::error!("error checking git status: {}", err),
        }
    }

    fn commit_and_push(&self, files: &[SavePath]) -> Result<String, PublishError> {
        let message = commit_message(&self.options.commit_prefix, files, Local::now());
        tracing::info!("committing with message: \"{}\"", message);
        self.repo.commit_allow_empty(&message)?;

        tracing::info!("pushing");
        self.repo.push()?;
        Ok(message)
    }
}

impl Publisher for Pipeline {
    fn publish(&self, batch: &[SavePath]) -> PublishOutcome {
        tracing::info!("processing {} file(s): {}", batch.len(), join_paths(batch));

        self.preflight();

        let files = self.ready_files(batch);
        if files.is_empty() {
            tracing::info!("no valid files to push");
            return PublishOutcome::NothingToPublish {
                dropped: batch.to_vec(),
            };
        }

        self.stage(&files);

        match self.commit_and_push(&files) {
            Ok(message) => {
                tracing::info!("push complete for: {}", join_paths(&files));
                PublishOutcome::Published { files, message }
            }
            Err(error) => {
                tracing::error!("error during push: {}", error);
                PublishOutcome::Failed { error }
            }
        }
    }
}

/// `"<prefix>: a, b - 2026-10-19 14:03:11"`
pub fn commit_message(prefix: &str, files: &[SavePath], at: DateTime<Local>) -> String {
    format!(
        "{prefix}: {} - {}",
        join_paths(files),
        at.format("%Y-%m-%d %H:%M:%S")
    )
}

fn join_paths(paths: &[SavePath]) -> String {
    paths
        .iter()
        .map(SavePath::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
