//! Git operations on the save repository.
//!
//! The repository working tree is the watch root. Every operation is one git
//! invocation through the configured [`CommandRunner`], except removing the
//! stale index lock, which is a direct filesystem operation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use savesync_core::SavePath;

use crate::error::{io_err, PublishError};
use crate::runner::{CommandOutput, CommandRunner};

pub struct Repository {
    root: PathBuf,
    remote: String,
    branch: String,
    runner: Arc<dyn CommandRunner>,
}

impl Repository {
    pub fn new(
        root: impl Into<PathBuf>,
        remote: impl Into<String>,
        branch: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            root: root.into(),
            remote: remote.into(),
            branch: branch.into(),
            runner,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/.git/index.lock`
    pub fn index_lock_path(&self) -> PathBuf {
        self.root.join(".git").join("index.lock")
    }

    /// Remove a leftover `index.lock` from a crashed git process.
    ///
    /// Returns `Ok(true)` if a lock was removed, `Ok(false)` if none existed.
    pub fn remove_stale_index_lock(&self) -> Result<bool, PublishError> {
        let lock = self.index_lock_path();
        match std::fs::remove_file(&lock) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(lock, err)),
        }
    }

    pub fn pull(&self) -> Result<CommandOutput, PublishError> {
        self.git(&["pull", &self.remote, &self.branch])
    }

    pub fn add(&self, path: &SavePath) -> Result<CommandOutput, PublishError> {
        self.git(&["add", "--", path.as_str()])
    }

    /// Stage even when git considers the file unchanged or ignored.
    pub fn force_add(&self, path: &SavePath) -> Result<CommandOutput, PublishError> {
        self.git(&["add", "-f", "--", path.as_str()])
    }

    /// `true` if `git status --porcelain` reports nothing.
    pub fn is_clean(&self) -> Result<bool, PublishError> {
        let output = self.git(&["status", "--porcelain"])?;
        Ok(output.stdout.trim().is_empty())
    }

    pub fn commit_allow_empty(&self, message: &str) -> Result<CommandOutput, PublishError> {
        self.git(&["commit", "--allow-empty", "-m", message])
    }

    pub fn push(&self) -> Result<CommandOutput, PublishError> {
        self.git(&["push", &self.remote, &self.branch])
    }

    fn git(&self, args: &[&str]) -> Result<CommandOutput, PublishError> {
        self.runner.run("git", args, &self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Vec<String>>>,
        stdout: String,
    }

    impl CommandRunner for Recorder {
        fn run(&self, program: &str, args: &[&str], _cwd: &Path) -> Result<CommandOutput, PublishError> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().map(|a| a.to_string()));
            self.calls.lock().unwrap().push(call);
            Ok(CommandOutput {
                stdout: self.stdout.clone(),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn commands_target_configured_remote_and_branch() {
        let recorder = Arc::new(Recorder::default());
        let repo = Repository::new("/saves", "backup", "saves", recorder.clone());
        repo.pull().unwrap();
        repo.push().unwrap();
        repo.force_add(&SavePath::from("UABC12345/icon0.png")).unwrap();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0], ["git", "pull", "backup", "saves"]);
        assert_eq!(calls[1], ["git", "push", "backup", "saves"]);
        assert_eq!(calls[2], ["git", "add", "-f", "--", "UABC12345/icon0.png"]);
    }

    #[test]
    fn is_clean_reads_porcelain_output() {
        let dirty = Repository::new(
            "/saves",
            "origin",
            "main",
            Arc::new(Recorder {
                stdout: " M UABC12345/data.bin\n".to_string(),
                ..Recorder::default()
            }),
        );
        assert!(!dirty.is_clean().unwrap());

        let clean = Repository::new("/saves", "origin", "main", Arc::new(Recorder::default()));
        assert!(clean.is_clean().unwrap());
    }

    #[test]
    fn stale_index_lock_is_removed_once() {
        let root = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(root.path().join(".git")).unwrap();
        std::fs::write(root.path().join(".git/index.lock"), b"").unwrap();

        let repo = Repository::new(root.path(), "origin", "main", Arc::new(Recorder::default()));
        assert!(repo.remove_stale_index_lock().unwrap());
        assert!(!repo.index_lock_path().exists());
        assert!(!repo.remove_stale_index_lock().unwrap());
    }
}
