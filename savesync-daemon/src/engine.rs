//! Batching engine: change aggregation, single-flight publishing, and retries.
//!
//! One task owns the pending set, the in-flight flag, and the retry counter.
//! Everything else talks to it through [`EngineHandle`], so every
//! check-then-mutate on that state happens on a single task with no awaits
//! in between. Publishing runs on the blocking pool and reports back with a
//! message; the engine keeps accepting events meanwhile.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use savesync_core::{Config, PublishKind, PublishRecord, SavePath};
use savesync_publish::{PublishOutcome, Publisher};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Instant};

use crate::error::DaemonError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub debounce: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: config.debounce(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        }
    }
}

/// Snapshot of engine state for `savesync daemon status`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub pending: Vec<SavePath>,
    pub in_flight: bool,
    pub flush_armed: bool,
    pub retry_count: u32,
    pub last_publish: Option<PublishRecord>,
}

/// How the engine wound down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownOutcome {
    /// Nothing was pending.
    Clean,
    /// The final flush committed (or found nothing left to commit).
    Flushed,
    /// The final flush failed or did not finish in time.
    FlushFailed,
}

impl ShutdownOutcome {
    pub fn exit_code(self) -> u8 {
        match self {
            ShutdownOutcome::Clean | ShutdownOutcome::Flushed => 0,
            ShutdownOutcome::FlushFailed => 1,
        }
    }
}

enum EngineMsg {
    Enqueue(SavePath),
    Flush,
    Status(oneshot::Sender<EngineStatus>),
    Drain(oneshot::Sender<ShutdownOutcome>),
}

/// Messages from tasks the engine spawned itself.
enum Internal {
    Finished {
        batch: Vec<SavePath>,
        result: AttemptResult,
    },
    RetryDue(Vec<SavePath>),
}

enum AttemptResult {
    Published(Vec<SavePath>),
    NothingToPublish,
    Failed(String),
}

impl From<PublishOutcome> for AttemptResult {
    fn from(outcome: PublishOutcome) -> Self {
        match outcome {
            PublishOutcome::Published { files, .. } => AttemptResult::Published(files),
            PublishOutcome::NothingToPublish { .. } => AttemptResult::NothingToPublish,
            PublishOutcome::Failed { error } => AttemptResult::Failed(error.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineMsg>,
}

impl EngineHandle {
    /// Queue a gate-accepted path and restart the quiet period.
    pub async fn enqueue(&self, path: SavePath) -> Result<(), DaemonError> {
        self.send(EngineMsg::Enqueue(path)).await
    }

    /// Flush now. A no-op if nothing is pending or a publish is in flight.
    pub async fn flush(&self) -> Result<(), DaemonError> {
        self.send(EngineMsg::Flush).await
    }

    pub async fn status(&self) -> Result<EngineStatus, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineMsg::Status(tx)).await?;
        rx.await
            .map_err(|_| DaemonError::ChannelClosed("engine status"))
    }

    /// Stop the engine after one final flush of whatever is pending.
    pub async fn drain(&self) -> Result<ShutdownOutcome, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineMsg::Drain(tx)).await?;
        rx.await.map_err(|_| DaemonError::ChannelClosed("engine drain"))
    }

    async fn send(&self, msg: EngineMsg) -> Result<(), DaemonError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| DaemonError::ChannelClosed("engine queue"))
    }
}

struct Drain {
    respond_to: oneshot::Sender<ShutdownOutcome>,
    final_started: bool,
    final_succeeded: bool,
}

pub struct Engine {
    settings: EngineSettings,
    publisher: Arc<dyn Publisher>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    pending: BTreeSet<SavePath>,
    /// Paths of failed batches whose retry timer has not fired yet.
    awaiting_retry: BTreeSet<SavePath>,
    in_flight: bool,
    retry_count: u32,
    deadline: Option<Instant>,
    last_publish: Option<PublishRecord>,
    drain: Option<Drain>,
}

impl Engine {
    /// Spawn the engine task on the current runtime.
    pub fn spawn(
        settings: EngineSettings,
        publisher: Arc<dyn Publisher>,
    ) -> (EngineHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(256);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let engine = Engine {
            settings,
            publisher,
            internal_tx,
            pending: BTreeSet::new(),
            awaiting_retry: BTreeSet::new(),
            in_flight: false,
            retry_count: 0,
            deadline: None,
            last_publish: None,
            drain: None,
        };
        let task = tokio::spawn(engine.run(rx, internal_rx));
        (EngineHandle { tx }, task)
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<EngineMsg>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                msg = rx.recv(), if self.drain.is_none() => {
                    let Some(msg) = msg else { break };
                    self.handle(msg);
                }
                Some(internal) = internal_rx.recv() => self.handle_internal(internal),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    tracing::info!("debounce period ended, processing queued files");
                    self.flush();
                }
            }
            if self.try_finish_drain() {
                break;
            }
        }
    }

    fn handle(&mut self, msg: EngineMsg) {
        match msg {
            EngineMsg::Enqueue(path) => self.enqueue(path),
            EngineMsg::Flush => self.flush(),
            EngineMsg::Status(respond_to) => {
                let _ = respond_to.send(self.status());
            }
            EngineMsg::Drain(respond_to) => {
                tracing::info!(pending = self.pending.len(), "draining engine");
                self.deadline = None;
                self.pending.append(&mut self.awaiting_retry);
                self.drain = Some(Drain {
                    respond_to,
                    final_started: false,
                    final_succeeded: false,
                });
            }
        }
    }

    fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Finished { batch, result } => self.finished(batch, result),
            Internal::RetryDue(batch) => {
                for path in &batch {
                    self.awaiting_retry.remove(path);
                }
                self.pending.extend(batch);
                if self.drain.is_none() {
                    self.flush();
                }
            }
        }
    }

    fn enqueue(&mut self, path: SavePath) {
        tracing::info!(path = %path, "queuing save file");
        self.pending.insert(path);
        self.deadline = Some(Instant::now() + self.settings.debounce);
    }

    /// Take the pending set and publish it, unless a publish is already running.
    fn flush(&mut self) {
        if self.pending.is_empty() || self.in_flight {
            tracing::debug!(
                pending = self.pending.len(),
                in_flight = self.in_flight,
                "skipping flush: nothing pending or a publish is active",
            );
            return;
        }

        self.in_flight = true;
        let batch: Vec<SavePath> = std::mem::take(&mut self.pending).into_iter().collect();

        let publisher = self.publisher.clone();
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let snapshot = batch.clone();
            let result = match tokio::task::spawn_blocking(move || publisher.publish(&snapshot)).await
            {
                Ok(outcome) => AttemptResult::from(outcome),
                Err(err) => AttemptResult::Failed(format!("publish task join error: {err}")),
            };
            let _ = internal_tx.send(Internal::Finished { batch, result });
        });
    }

    fn finished(&mut self, batch: Vec<SavePath>, result: AttemptResult) {
        self.in_flight = false;

        match result {
            AttemptResult::Published(files) => {
                tracing::info!(files = files.len(), "publish succeeded");
                self.retry_count = 0;
                self.last_publish = Some(PublishRecord::new(PublishKind::Published, files));
                self.mark_final(true);
            }
            AttemptResult::NothingToPublish => {
                tracing::info!(batch = batch.len(), "batch had no files left to publish");
                self.last_publish = Some(PublishRecord::new(PublishKind::NothingToPublish, batch));
                self.mark_final(true);
            }
            AttemptResult::Failed(error) => {
                tracing::error!(error = %error, "publish failed");
                self.last_publish = Some(
                    PublishRecord::new(PublishKind::Failed, batch.clone()).with_error(error),
                );
                match &self.drain {
                    // Fold the batch into the final flush instead of retrying.
                    Some(drain) if !drain.final_started => self.pending.extend(batch),
                    Some(_) => {}
                    None => self.schedule_retry(batch),
                }
            }
        }

        if self.drain.is_none() && !self.pending.is_empty() && self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.settings.debounce);
        }
    }

    fn schedule_retry(&mut self, batch: Vec<SavePath>) {
        if self.retry_count >= self.settings.max_retries {
            tracing::error!(
                batch = batch.len(),
                max_retries = self.settings.max_retries,
                "max retries exceeded, dropping batch",
            );
            self.retry_count = 0;
            self.last_publish = Some(PublishRecord::new(PublishKind::Dropped, batch));
            return;
        }

        self.retry_count += 1;
        tracing::warn!(
            attempt = self.retry_count,
            max_retries = self.settings.max_retries,
            delay_ms = self.settings.retry_delay.as_millis() as u64,
            "retrying publish",
        );
        self.awaiting_retry.extend(batch.iter().cloned());
        let delay = self.settings.retry_delay;
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = internal_tx.send(Internal::RetryDue(batch));
        });
    }

    fn mark_final(&mut self, succeeded: bool) {
        if let Some(drain) = self.drain.as_mut() {
            if drain.final_started {
                drain.final_succeeded = succeeded;
            }
        }
    }

    /// Advance a pending drain. Returns `true` once the engine should stop.
    fn try_finish_drain(&mut self) -> bool {
        let Some(drain) = self.drain.as_mut() else {
            return false;
        };
        if self.in_flight {
            return false;
        }
        if !drain.final_started && !self.pending.is_empty() {
            tracing::info!("pending changes detected, attempting final push");
            drain.final_started = true;
            self.flush();
            return false;
        }

        let Some(drain) = self.drain.take() else {
            return false;
        };
        let outcome = match (drain.final_started, drain.final_succeeded) {
            (false, _) => ShutdownOutcome::Clean,
            (true, true) => ShutdownOutcome::Flushed,
            (true, false) => ShutdownOutcome::FlushFailed,
        };
        let _ = drain.respond_to.send(outcome);
        true
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            pending: self.pending.iter().cloned().collect(),
            in_flight: self.in_flight,
            flush_armed: self.deadline.is_some(),
            retry_count: self.retry_count,
            last_publish: self.last_publish.clone(),
        }
    }
}
