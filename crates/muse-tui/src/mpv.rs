//! mpv IPC driver — the production media backend.
//!
//! Architecture:
//!
//! ```text
//!   MpvBackend (implements player::MediaBackend)
//!         │ lazily spawns mpv --idle and connects on first load()
//!         ├── writer_task   ← receives requests via mpsc, serialises → socket
//!         └── reader_task   ← reads JSON lines from socket
//!                                ├── response (has request_id) → matched oneshot::Sender
//!                                └── event / property-change   → translated MediaEvent
//! ```
//!
//! Observed properties (pause, time-pos, duration) and the end-file event are
//! translated into [`MediaEvent`]s for the playback controller, which treats
//! them as the only source of truth for transport state.
//!
//! Platform notes:
//! - Unix:    Unix domain sockets
//! - Windows: Named pipes  \\.\pipe\<name>

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use async_trait::async_trait;

use crate::player::{MediaBackend, MediaEvent};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── observation property IDs ──────────────────────────────────────────────────

pub const OBS_PAUSE: u64 = 1;
pub const OBS_TIME_POS: u64 = 2;
pub const OBS_DURATION: u64 = 3;

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

/// Translate a raw mpv event into a controller-facing [`MediaEvent`].
/// Only `end-file` with reason `eof` counts as a natural end; replacement
/// loads and explicit stops must not trigger auto-advance.
pub fn translate_event(event: &MpvEvent) -> Option<MediaEvent> {
    if let Some((obs_id, data)) = event.as_property_change() {
        return match obs_id {
            OBS_PAUSE => Some(MediaEvent::PauseChanged(data.as_bool().unwrap_or(false))),
            OBS_TIME_POS => Some(MediaEvent::Position(data.as_f64())),
            OBS_DURATION => Some(MediaEvent::Duration(data.as_f64())),
            _ => None,
        };
    }
    if event.event_name() == Some("end-file") {
        let reason = event
            .raw
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        debug!("mpv: end-file reason={}", reason);
        if reason == "eof" {
            return Some(MediaEvent::Ended);
        }
    }
    None
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    pub async fn load(&self, url: &str, volume: f64) -> anyhow::Result<()> {
        debug!("mpv: sending loadfile command for url={}", url);
        self.send(json!(["loadfile", url])).await?;
        let vol_pct = (volume * 100.0).clamp(0.0, 100.0);
        let _ = self.send(json!(["set_property", "volume", vol_pct])).await;
        // loadfile leaves a paused player paused; make the start explicit.
        let _ = self.send(json!(["set_property", "pause", false])).await;
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        let _ = self.send(json!(["stop"])).await;
        Ok(())
    }

    pub async fn set_volume(&self, volume: f64) -> anyhow::Result<()> {
        let vol_pct = (volume * 100.0).clamp(0.0, 100.0);
        self.send(json!(["set_property", "volume", vol_pct]))
            .await?;
        Ok(())
    }

    pub async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    pub async fn seek_to(&self, secs: f64) -> anyhow::Result<()> {
        self.send(json!(["set_property", "time-pos", secs])).await?;
        Ok(())
    }

    /// Register observe_property for everything the controller consumes.
    /// Must be called after every fresh connection; mpv then pushes a
    /// property-change whenever any of these values change.
    pub async fn observe_all_properties(&self) {
        let props = [
            (OBS_PAUSE, "pause"),
            (OBS_TIME_POS, "time-pos"),
            (OBS_DURATION, "duration"),
        ];
        for (id, name) in &props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process and manages (re)connection.
struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
}

impl MpvDriver {
    fn new() -> Self {
        Self {
            socket_name: muse_core::platform::mpv_socket_name(),
            process: None,
        }
    }

    fn process_alive(&mut self) -> bool {
        if let Some(ref mut child) = self.process {
            match child.try_wait() {
                Ok(None) => true, // Still running
                Ok(Some(status)) => {
                    if let Some(code) = status.code() {
                        warn!("mpv process exited with code: {}", code);
                    } else {
                        warn!("mpv process terminated by signal");
                    }
                    false
                }
                Err(e) => {
                    warn!("mpv process_alive check failed: {}", e);
                    false
                }
            }
        } else {
            false
        }
    }

    async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    // ── spawn / reconnect ─────────────────────────────────────────────────────

    #[cfg(unix)]
    async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        // Kill stale process
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        info!("mpv: spawning new process");
        let mpv_binary = muse_core::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let ipc_arg = muse_core::platform::mpv_socket_arg();
        let child = tokio::process::Command::new(&mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(&ipc_arg)
            .arg("--quiet")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;
        info!("mpv: spawned process with pid {:?}", child.id());
        self.process = Some(child);

        // Wait for socket to appear
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        Ok(start_io_tasks(stream, event_tx))
    }

    /// Try to connect to an already-running mpv socket without spawning.
    #[cfg(unix)]
    async fn try_reconnect(&mut self, event_tx: mpsc::Sender<MpvEvent>) -> Option<MpvHandle> {
        let socket_path = std::path::PathBuf::from(&self.socket_name);
        if !socket_path.exists() {
            return None;
        }
        match UnixStream::connect(&socket_path).await {
            Ok(stream) => {
                info!("mpv: reconnected to existing IPC socket");
                Some(start_io_tasks(stream, event_tx))
            }
            Err(e) => {
                warn!("mpv: failed to reconnect: {}", e);
                None
            }
        }
    }

    #[cfg(windows)]
    async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }

        info!("mpv: spawning new process");
        let mpv_binary = muse_core::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        let ipc_arg = muse_core::platform::mpv_socket_arg();
        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(&ipc_arg)
            .arg("--quiet")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;
        self.process = Some(child);

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            match ClientOptions::new().open(&pipe_path) {
                Ok(client) => {
                    info!("mpv: connected to named pipe");
                    return Ok(start_io_tasks_windows(client, event_tx));
                }
                Err(_) => continue,
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }

    #[cfg(windows)]
    async fn try_reconnect(&mut self, event_tx: mpsc::Sender<MpvEvent>) -> Option<MpvHandle> {
        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        match ClientOptions::new().open(&pipe_path) {
            Ok(client) => {
                info!("mpv: reconnected to named pipe");
                Some(start_io_tasks_windows(client, event_tx))
            }
            Err(e) => {
                warn!("mpv: failed to reconnect to named pipe: {}", e);
                None
            }
        }
    }
}

#[cfg(unix)]
fn start_io_tasks(stream: UnixStream, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle {
    let (read_half, write_half) = stream.into_split();
    let reader = BufReader::new(read_half);

    // pending map: req_id → reply channel.  Shared between writer (inserts) and reader (resolves).
    let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>> =
        Arc::new(Mutex::new(HashMap::new()));

    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    let pending_w = pending.clone();
    tokio::spawn(writer_task(write_half, cmd_rx, pending_w));
    tokio::spawn(reader_task(reader, pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

#[cfg(windows)]
fn start_io_tasks_windows(
    pipe: tokio::net::windows::named_pipe::NamedPipeClient,
    event_tx: mpsc::Sender<MpvEvent>,
) -> MpvHandle {
    use tokio::io::split;
    let (read_half, write_half) = split(pipe);
    let reader = BufReader::new(read_half);

    let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>> =
        Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    let pending_w = pending.clone();
    tokio::spawn(writer_task(write_half, cmd_rx, pending_w));
    tokio::spawn(reader_task(reader, pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>,
    event_tx: mpsc::Sender<MpvEvent>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                // Fail all pending requests
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC connection closed")));
                }
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    // This is a command response — route to pending request
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let result = if val["error"].as_str() == Some("success") {
                            Ok(val)
                        } else {
                            let err = val["error"].as_str().unwrap_or("unknown error").to_string();
                            debug!("mpv reader: response req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        };
                        let _ = tx.send(result);
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    // Unsolicited event / property-change
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                let mut map = pending.lock().await;
                for (_, tx) in map.drain() {
                    let _ = tx.send(Err(anyhow::anyhow!("mpv IPC read error: {}", e)));
                }
                break;
            }
        }
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<PendingRequest>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        {
            let mut map = pending.lock().await;
            map.insert(req.req_id, req.reply);
        }
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            // Remove and fail the request we just registered
            let mut map = pending.lock().await;
            if let Some(tx) = map.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── MediaBackend implementation ───────────────────────────────────────────────

struct MpvInner {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
}

/// Lazy mpv-backed media element: the process is spawned on the first
/// `load()` and reused afterwards. Exactly one mpv instance is active;
/// loading a new URL replaces the previous stream inside it.
pub struct MpvBackend {
    inner: Mutex<MpvInner>,
    media_tx: mpsc::Sender<MediaEvent>,
}

impl MpvBackend {
    pub fn new(media_tx: mpsc::Sender<MediaEvent>) -> Self {
        Self {
            inner: Mutex::new(MpvInner {
                driver: MpvDriver::new(),
                handle: None,
            }),
            media_tx,
        }
    }

    /// Connect (or reconnect) and wire the raw event stream through the
    /// translator into the controller's media channel.
    async fn ensure_handle(&self, inner: &mut MpvInner) -> anyhow::Result<MpvHandle> {
        if inner.handle.is_some() && !inner.driver.process_alive() {
            // A reconnected external mpv has no child process to check, so
            // only drop the handle when we owned the process and it died.
            if inner.driver.process.is_some() {
                warn!("mpv: process died, dropping handle");
                inner.handle = None;
            }
        }

        if let Some(handle) = &inner.handle {
            return Ok(handle.clone());
        }

        let (event_tx, mut event_rx) = mpsc::channel::<MpvEvent>(64);
        let media_tx = self.media_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if let Some(media_event) = translate_event(&event) {
                    if media_tx.send(media_event).await.is_err() {
                        break;
                    }
                }
            }
        });

        let handle = match inner.driver.try_reconnect(event_tx.clone()).await {
            Some(handle) => handle,
            None => inner.driver.spawn_and_connect(event_tx).await?,
        };
        handle.observe_all_properties().await;
        inner.handle = Some(handle.clone());
        Ok(handle)
    }
}

#[async_trait]
impl MediaBackend for MpvBackend {
    async fn load(&self, url: &str, volume: f64) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        let handle = self.ensure_handle(&mut inner).await?;
        handle.load(url, volume).await
    }

    async fn set_paused(&self, paused: bool) -> anyhow::Result<()> {
        let inner = self.inner.lock().await;
        match &inner.handle {
            Some(handle) => handle.set_pause(paused).await,
            None => Ok(()),
        }
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let inner = self.inner.lock().await;
        match &inner.handle {
            Some(handle) => handle.stop().await,
            None => Ok(()),
        }
    }

    async fn seek_to(&self, secs: f64) -> anyhow::Result<()> {
        let inner = self.inner.lock().await;
        match &inner.handle {
            Some(handle) => handle.seek_to(secs).await,
            None => Ok(()),
        }
    }

    async fn set_volume(&self, volume: f64) -> anyhow::Result<()> {
        let inner = self.inner.lock().await;
        match &inner.handle {
            Some(handle) => handle.set_volume(volume).await,
            None => Ok(()),
        }
    }

    /// Kill the owned mpv process on app teardown.
    async fn shutdown(&self) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(handle) = inner.handle.take() {
            let _ = handle.stop().await;
        }
        inner.driver.kill().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(raw: Value) -> MpvEvent {
        MpvEvent { raw }
    }

    #[test]
    fn test_translate_property_changes() {
        let pause = event(json!({"event": "property-change", "id": OBS_PAUSE, "data": true}));
        assert_eq!(translate_event(&pause), Some(MediaEvent::PauseChanged(true)));

        let pos = event(json!({"event": "property-change", "id": OBS_TIME_POS, "data": 12.5}));
        assert_eq!(translate_event(&pos), Some(MediaEvent::Position(Some(12.5))));

        let cleared = event(json!({"event": "property-change", "id": OBS_TIME_POS, "data": null}));
        assert_eq!(translate_event(&cleared), Some(MediaEvent::Position(None)));

        let dur = event(json!({"event": "property-change", "id": OBS_DURATION, "data": 183.0}));
        assert_eq!(
            translate_event(&dur),
            Some(MediaEvent::Duration(Some(183.0)))
        );
    }

    #[test]
    fn test_translate_end_file_only_on_eof() {
        let eof = event(json!({"event": "end-file", "reason": "eof"}));
        assert_eq!(translate_event(&eof), Some(MediaEvent::Ended));

        // Replacing the stream or stopping must not look like a natural end.
        let stopped = event(json!({"event": "end-file", "reason": "stop"}));
        assert_eq!(translate_event(&stopped), None);
        let errored = event(json!({"event": "end-file", "reason": "error"}));
        assert_eq!(translate_event(&errored), None);
    }

    #[test]
    fn test_translate_ignores_unrelated_events() {
        assert_eq!(
            translate_event(&event(json!({"event": "file-loaded"}))),
            None
        );
        assert_eq!(
            translate_event(&event(json!({"event": "property-change", "id": 99, "data": 1}))),
            None
        );
    }
}
