//! Error types for savesync-publish.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from running git against the save repository.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A command ran but exited unsuccessfully.
    #[error("command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`PublishError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PublishError {
    PublishError::Io {
        path: path.into(),
        source,
    }
}
