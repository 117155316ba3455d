//! Filesystem watcher feeding the engine.
//!
//! Raw notify events go through three filters before reaching the engine:
//! ignore rules (hidden, `.git`, `tmp_*`), the [`WriteSettler`] (a path is
//! reported only once its size and mtime stop changing), and the stability gate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use savesync_core::{GateDecision, StabilityGate};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::engine::EngineHandle;
use crate::error::DaemonError;
use crate::paths::SETTLE_CHECK_INTERVAL;

/// Size and mtime; a change in either means the writer is still busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSignature {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileSignature {
    pub fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

#[derive(Debug)]
struct Observation {
    signature: Option<FileSignature>,
    since: Instant,
}

/// Holds changed paths until their writes have finished.
#[derive(Debug)]
pub struct WriteSettler {
    threshold: Duration,
    observed: HashMap<PathBuf, Observation>,
}

impl WriteSettler {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            observed: HashMap::new(),
        }
    }

    /// Record a change event; restarts the path's stability window.
    pub fn observe(&mut self, path: PathBuf, signature: Option<FileSignature>, now: Instant) {
        self.observed.insert(
            path,
            Observation {
                signature,
                since: now,
            },
        );
    }

    /// Paths whose signature has not changed for the threshold. Paths that
    /// disappeared are forgotten without being reported.
    pub fn settled(
        &mut self,
        now: Instant,
        signature_of: impl Fn(&Path) -> Option<FileSignature>,
    ) -> Vec<PathBuf> {
        let mut ready = Vec::new();
        self.observed.retain(|path, obs| {
            let current = signature_of(path);
            if current != obs.signature {
                obs.signature = current;
                obs.since = now;
                return true;
            }
            if now.duration_since(obs.since) < self.threshold {
                return true;
            }
            if current.is_some() {
                ready.push(path.clone());
            }
            false
        });
        ready.sort();
        ready
    }

    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }
}

/// Hidden entries (including `.git`) and `tmp_*` scratch files are never watched.
pub fn is_ignored(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|component| {
        let segment = component.as_os_str().to_string_lossy();
        segment.starts_with('.') || segment.starts_with("tmp_")
    })
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Gate a settled path and hand it to the engine if accepted.
pub async fn forward(
    gate: &StabilityGate,
    engine: &EngineHandle,
    path: &Path,
) -> Result<bool, DaemonError> {
    match gate.evaluate(path) {
        GateDecision::Accept(save_path) => {
            engine.enqueue(save_path).await?;
            Ok(true)
        }
        GateDecision::Reject(reason) => {
            tracing::debug!(path = %path.display(), reason = %reason, "skipping file");
            Ok(false)
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    pub stability: Duration,
}

/// Watch `gate.root()` until shutdown is signalled.
pub async fn watch(
    gate: StabilityGate,
    settings: WatchSettings,
    engine: EngineHandle,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let root = gate.root().to_path_buf();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let config = notify::Config::default().with_poll_interval(settings.poll_interval);
    let mut watcher = PollWatcher::new(
        move |event| {
            let _ = event_tx.send(event);
        },
        config,
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    tracing::info!(root = %root.display(), "monitoring saves");

    let mut settler = WriteSettler::new(settings.stability);
    let mut tick = tokio::time::interval(SETTLE_CHECK_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                for path in event.paths {
                    if is_ignored(&root, &path) {
                        continue;
                    }
                    let signature = FileSignature::of(&path);
                    settler.observe(path, signature, Instant::now());
                }
            }
            _ = tick.tick(), if !settler.is_empty() => {
                for path in settler.settled(Instant::now(), FileSignature::of) {
                    forward(&gate, &engine, &path).await?;
                }
            }
        }
    }

    if let Err(err) = watcher.unwatch(&root) {
        tracing::debug!(error = %err, "unwatch on shutdown failed");
    }
    tracing::info!("watcher stopped");
    Ok(())
}
