//! Stability gate: decides whether a watcher event refers to a save artifact.
//!
//! A path is accepted iff it sits at least two segments below the watch root,
//! its top-level directory matches the save-container pattern, and its
//! extension is in the allow-list. Matching is case-insensitive throughout.
//! The gate is a pure predicate; existence and lock checks happen at publish time.

use std::fmt;
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};

use crate::config::Config;
use crate::error::ConfigError;
use crate::types::SavePath;

/// Why the gate refused a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Not below the watch root at all.
    OutsideRoot,
    /// Directly in the watch root; top-level files are never synchronized.
    TopLevel,
    /// Top-level directory is not a save container.
    ForeignContainer(String),
    /// Extension missing or not allowed.
    Extension,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::OutsideRoot => write!(f, "outside the watch root"),
            Rejection::TopLevel => write!(f, "not inside a save container"),
            Rejection::ForeignContainer(dir) => write!(f, "'{dir}' is not a save container"),
            Rejection::Extension => write!(f, "extension not allowed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Accept(SavePath),
    Reject(Rejection),
}

impl GateDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, GateDecision::Accept(_))
    }
}

#[derive(Debug, Clone)]
pub struct StabilityGate {
    root: PathBuf,
    container: Regex,
    extensions: Vec<String>,
}

impl StabilityGate {
    pub fn new(
        root: impl Into<PathBuf>,
        container_pattern: &str,
        extensions: &[String],
    ) -> Result<Self, ConfigError> {
        let container = RegexBuilder::new(container_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: container_pattern.to_string(),
                source,
            })?;
        let extensions = extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Ok(Self {
            root: root.into(),
            container,
            extensions,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(
            config.watch_root.clone(),
            &config.container_pattern,
            &config.extensions,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Evaluate an absolute path under the root, or a path already relative to it.
    pub fn evaluate(&self, path: &Path) -> GateDecision {
        let relative = if path.is_absolute() {
            match path.strip_prefix(&self.root) {
                Ok(rel) => rel,
                Err(_) => return GateDecision::Reject(Rejection::OutsideRoot),
            }
        } else {
            path
        };

        let Some(save_path) = SavePath::from_relative(relative) else {
            return GateDecision::Reject(Rejection::OutsideRoot);
        };

        let segments: Vec<&str> = save_path.segments().collect();
        if segments.len() < 2 {
            return GateDecision::Reject(Rejection::TopLevel);
        }
        if !self.container.is_match(segments[0]) {
            return GateDecision::Reject(Rejection::ForeignContainer(segments[0].to_string()));
        }

        let allowed = relative
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
            .unwrap_or(false);
        if !allowed {
            return GateDecision::Reject(Rejection::Extension);
        }

        GateDecision::Accept(save_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> StabilityGate {
        StabilityGate::from_config(&Config::new("/saves")).expect("default gate")
    }

    #[test]
    fn accepts_save_file_in_container() {
        let decision = gate().evaluate(Path::new("/saves/UABC12345/data0000.bin"));
        assert_eq!(
            decision,
            GateDecision::Accept(SavePath::from("UABC12345/data0000.bin"))
        );
    }

    #[test]
    fn rejects_top_level_file() {
        assert_eq!(
            gate().evaluate(Path::new("/saves/readme.txt")),
            GateDecision::Reject(Rejection::TopLevel)
        );
    }

    #[test]
    fn rejects_path_outside_root() {
        assert_eq!(
            gate().evaluate(Path::new("/elsewhere/UABC12345/data.bin")),
            GateDecision::Reject(Rejection::OutsideRoot)
        );
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let err = StabilityGate::new("/saves", "([unclosed", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn extensions_with_leading_dot_are_normalised() {
        let gate = StabilityGate::new("/saves", r"^[A-Z]{4}\d{5}$", &[".SAV".to_string()])
            .expect("gate");
        assert!(gate.evaluate(Path::new("UABC12345/slot.sav")).is_accept());
    }
}
