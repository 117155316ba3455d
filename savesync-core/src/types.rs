//! Domain types shared by the publish pipeline and the daemon.
//!
//! Paths handed between components are always repository-relative and use
//! `/` as the separator, whatever the host OS.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SavePath
// ---------------------------------------------------------------------------

/// A repository-relative path to a save artifact, e.g. `UABC12345/data0000.bin`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SavePath(pub String);

impl SavePath {
    /// Build from a path already relative to the watch root.
    ///
    /// Returns `None` for paths that escape the root (`..`), are absolute, or
    /// contain non UTF-8 segments.
    pub fn from_relative(path: &Path) -> Option<Self> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(segment) => segments.push(segment.to_str()?),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if segments.is_empty() {
            return None;
        }
        Some(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Absolute location of this path under `root`.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        self.segments().fold(root.to_path_buf(), |acc, seg| acc.join(seg))
    }
}

impl fmt::Display for SavePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SavePath {
    fn from(s: &str) -> Self {
        Self(s.replace('\\', "/"))
    }
}

impl From<String> for SavePath {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

// ---------------------------------------------------------------------------
// Publish bookkeeping
// ---------------------------------------------------------------------------

/// How a publish attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishKind {
    /// Commit and push succeeded.
    Published,
    /// Every file in the batch vanished before staging; nothing was committed.
    NothingToPublish,
    /// The attempt failed and was handed to the retry controller.
    Failed,
    /// Retries were exhausted and the batch was abandoned.
    Dropped,
}

/// The most recent publish attempt, as reported by `savesync daemon status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRecord {
    pub kind: PublishKind,
    pub files: Vec<SavePath>,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublishRecord {
    pub fn new(kind: PublishKind, files: Vec<SavePath>) -> Self {
        Self {
            kind,
            files,
            at: Utc::now(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_relative_joins_with_forward_slashes() {
        let rel = Path::new("UABC12345").join("data0000.bin");
        let path = SavePath::from_relative(&rel).expect("relative path");
        assert_eq!(path.as_str(), "UABC12345/data0000.bin");
    }

    #[test]
    fn from_relative_rejects_parent_escape() {
        assert!(SavePath::from_relative(Path::new("../outside.bin")).is_none());
        assert!(SavePath::from_relative(Path::new("")).is_none());
    }

    #[test]
    fn from_str_normalises_backslashes() {
        let path = SavePath::from("UABC12345\\icon0.png");
        assert_eq!(path.segments().collect::<Vec<_>>(), ["UABC12345", "icon0.png"]);
    }

    #[test]
    fn to_path_resolves_under_root() {
        let root = PathBuf::from("/saves");
        let path = SavePath::from("UABC12345/icon0.png");
        assert_eq!(path.to_path(&root), root.join("UABC12345").join("icon0.png"));
    }

    #[test]
    fn record_serialises_kind_in_snake_case() {
        let record = PublishRecord::new(PublishKind::NothingToPublish, vec![]);
        let yaml = serde_yaml::to_string(&record).expect("serialize");
        assert!(yaml.contains("nothing_to_publish"), "got: {yaml}");
        assert!(!yaml.contains("error"), "absent error should be skipped");
    }
}
