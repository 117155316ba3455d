//! # savesync-publish
//!
//! Turns a batch of changed save files into one commit on the remote.
//!
//! [`Pipeline::publish`] runs the whole sequence (pre-flight cleanup, file
//! readiness, staging, forced commit, push) against a [`Repository`], which
//! issues git commands through a [`CommandRunner`].

pub mod error;
pub mod files;
pub mod pipeline;
pub mod repo;
pub mod runner;

pub use error::PublishError;
pub use pipeline::{commit_message, Pipeline, PublishOptions, PublishOutcome, Publisher};
pub use repo::Repository;
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
