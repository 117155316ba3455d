//! savesync daemon: watcher + batching engine + control socket.

pub mod engine;
mod error;
pub mod paths;
pub mod probe;
pub mod protocol;
mod runtime;
pub mod watcher;

pub use engine::{Engine, EngineHandle, EngineSettings, EngineStatus, ShutdownOutcome};
pub use error::DaemonError;
pub use probe::{HttpsProbe, Probe};
pub use protocol::{
    request_flush, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, start_blocking};
