use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use savesync_core::{config, Config, LogFormat, StabilityGate};
use savesync_publish::{Pipeline, PublishOptions, Repository, SystemRunner};

use crate::engine::{Engine, EngineHandle, EngineSettings, ShutdownOutcome};
use crate::error::{io_err, DaemonError};
use crate::paths::{run_dir, socket_path};
use crate::probe::{HttpsProbe, Probe};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::watcher::{self, WatchSettings};

/// How long runtime teardown waits for blocking tasks (a publish stuck in
/// `git push` or a lock wait) after the daemon has decided its outcome.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Load config, start the runtime, and block the current thread until shutdown.
pub fn start_blocking(home: &Path) -> Result<ShutdownOutcome, DaemonError> {
    let config = config::load_at(home)?;
    init_tracing(config.log_format);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    let probe = Arc::new(HttpsProbe::from_config(&config));
    block_on_bounded(runtime, run(home.to_path_buf(), config, probe))
}

/// Drive `future` to completion, then tear the runtime down without waiting
/// on the blocking pool for longer than [`RUNTIME_SHUTDOWN_TIMEOUT`].
fn block_on_bounded<F: Future>(runtime: tokio::runtime::Runtime, future: F) -> F::Output {
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    output
}

/// Drain the engine, giving up after `grace`. Timing out counts as a failed
/// final flush.
async fn drain_within(engine: &EngineHandle, grace: Duration) -> ShutdownOutcome {
    match tokio::time::timeout(grace, engine.drain()).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            tracing::error!(error = %err, "engine drain failed");
            ShutdownOutcome::FlushFailed
        }
        Err(_) => {
            tracing::error!(grace_ms = grace.as_millis() as u64, "final push did not finish in time");
            ShutdownOutcome::FlushFailed
        }
    }
}

/// Run the daemon until a termination signal or a `stop` request.
///
/// Fails with [`DaemonError::Unreachable`] before starting anything if the
/// reachability probe fails.
pub async fn run(
    home: PathBuf,
    config: Config,
    probe: Arc<dyn Probe>,
) -> Result<ShutdownOutcome, DaemonError> {
    tokio::task::spawn_blocking(move || probe.check())
        .await
        .map_err(|err| DaemonError::Protocol(format!("probe task join error: {err}")))??;
    tracing::info!("network reachable, starting save sync");

    let gate = StabilityGate::from_config(&config)?;
    let repo = Repository::new(
        config.watch_root.clone(),
        config.remote.clone(),
        config.branch.clone(),
        Arc::new(SystemRunner),
    );
    let pipeline = Pipeline::new(repo, PublishOptions::from_config(&config));
    let (engine, engine_task) = Engine::spawn(EngineSettings::from_config(&config), Arc::new(pipeline));

    let started_at_unix = unix_seconds_now();
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let engine = engine.clone();
        let settings = WatchSettings {
            poll_interval: config.poll_interval(),
            stability: config.stability(),
        };
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = watcher::watch(gate, settings, engine, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let engine = engine.clone();
        let watch_root = config.watch_root.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                watch_root,
                engine,
                shutdown.clone(),
                shutdown_rx,
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = termination_signal() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received termination signal, shutting down");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("signal handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let _ = shutdown_rx.recv().await;

    // Stop accepting events before the final flush.
    let watcher_result = watcher_handle.await;

    let outcome = drain_within(&engine, config.shutdown_grace()).await;
    engine_task.abort();

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);
    handle_join("watcher", watcher_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;

    tracing::info!(outcome = ?outcome, "daemon stopped");
    Ok(outcome)
}

async fn termination_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

async fn socket_server_task(
    home: PathBuf,
    watch_root: PathBuf,
    engine: EngineHandle,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let run = run_dir(&home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }

    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let engine = engine.clone();
                let shutdown_tx = shutdown_tx.clone();
                let status_base = json!({
                    "running": true,
                    "started_at_unix": started_at_unix,
                    "watch_root": watch_root.display().to_string(),
                    "socket": socket.display().to_string(),
                });
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, engine, shutdown_tx, status_base).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    engine: EngineHandle,
    shutdown_tx: broadcast::Sender<()>,
    status_base: Value,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = respond(&request, &engine, &shutdown_tx, &status_base).await;
        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn respond(
    request: &DaemonRequest,
    engine: &EngineHandle,
    shutdown_tx: &broadcast::Sender<()>,
    status_base: &Value,
) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => match engine.status().await {
            Ok(status) => {
                let mut payload = status_base.clone();
                if let Some(started) = payload["started_at_unix"].as_u64() {
                    payload["uptime_secs"] = json!(unix_seconds_now().saturating_sub(started));
                }
                payload["engine"] = json!(status);
                DaemonResponse::ok(payload)
            }
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        "flush" => match engine.flush().await {
            Ok(()) => DaemonResponse::ok(json!({ "flush_requested": true })),
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        "stop" => {
            let _ = shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
