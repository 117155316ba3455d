//! savesync core library: domain types, configuration, and the stability gate.
//!
//! - [`types`] — [`SavePath`] and publish bookkeeping types
//! - [`config`] — YAML config under `~/.savesync/`
//! - [`gate`] — decides which watcher events may enter the sync queue
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod gate;
pub mod types;

pub use config::{Config, LogFormat};
pub use error::ConfigError;
pub use gate::{GateDecision, Rejection, StabilityGate};
pub use types::{PublishKind, PublishRecord, SavePath};
