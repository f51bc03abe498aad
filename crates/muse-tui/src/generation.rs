//! Generation task orchestrator.
//!
//! One submission drives one task: submit the prompt, then poll the status
//! endpoint on a fixed cadence until a terminal outcome. The moving parts are
//! split so the timing-free logic stays unit-testable:
//!
//!   - [`TaskMachine`] — the transition table (`Idle → Submitting → Polling →
//!     terminal`), one mutation entry point per transition, no timers.
//!   - [`run_task`] — the driver: a spawned tokio task that owns the schedule
//!     and feeds the machine from real network responses. Each poll is only
//!     issued after the previous round trip resolved, so polls never overlap.
//!   - [`GenerationEngine`] — the handle the app talks to. It owns the driver
//!     task plus a generation counter; cancelling bumps the counter, so a
//!     completion from an older task is detectably stale and gets discarded
//!     instead of mutating anything.
//!
//! Poll transport errors are terminal for the task, mirroring the backend
//! contract: a task whose status cannot be read is reported as failed rather
//! than retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use muse_core::api::{
    ApiClient, ApiError, GenerateRequest, Model, StatusResponse, SubmitResponse, VocalGender,
};
use muse_core::track::Track;

/// Wall-clock delay between status checks.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Poll budget per task: 120 polls at 3 s is a 6-minute ceiling.
pub const MAX_POLLS: u32 = 120;

// ── Options ───────────────────────────────────────────────────────────────────

/// User-facing knobs for one submission. Style, title, and vocal gender only
/// reach the wire in custom mode; empty strings are dropped entirely.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub model: Model,
    pub custom_mode: bool,
    pub instrumental: bool,
    pub style: String,
    pub title: String,
    pub vocal_gender: VocalGender,
    pub negative_tags: String,
}

impl GenerationOptions {
    pub fn to_request(&self, prompt: &str) -> GenerateRequest {
        let nonempty = |s: &str| {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        };
        let (style, title, vocal_gender) = if self.custom_mode {
            (
                nonempty(&self.style),
                nonempty(&self.title),
                Some(self.vocal_gender),
            )
        } else {
            (None, None, None)
        };
        GenerateRequest {
            prompt: prompt.trim().to_string(),
            custom_mode: self.custom_mode,
            instrumental: self.instrumental,
            model: self.model,
            style,
            title,
            vocal_gender,
            negative_tags: nonempty(&self.negative_tags),
        }
    }
}

// ── Errors / outcomes ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("backend returned no task id")]
    MissingTaskId,
    #[error("failed to start generation: {0}")]
    Submit(#[source] ApiError),
    #[error("status check failed: {0}")]
    PollTransport(#[source] ApiError),
    #[error("music generation failed")]
    TaskFailed,
}

/// How a task ended. `TimedOut` is distinct from `Failed` so the UI can
/// suggest a retry for the former.
#[derive(Debug)]
pub enum TaskOutcome {
    Succeeded { tracks: Vec<Track> },
    Failed(GenerationError),
    TimedOut,
}

/// Messages from the driver task back to the app event loop. Every message
/// carries the generation it belongs to; stale generations are dropped by
/// [`GenerationEngine::accept`].
#[derive(Debug)]
pub enum GenerationEvent {
    Submitted { generation: u64, task_id: String },
    Polled { generation: u64, poll_count: u32 },
    Finished { generation: u64, outcome: TaskOutcome },
}

// ── API seam ──────────────────────────────────────────────────────────────────

/// The two backend calls the orchestrator needs. Production uses
/// [`ApiClient`]; tests inject scripted implementations.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    async fn submit(&self, request: &GenerateRequest) -> Result<SubmitResponse, ApiError>;
    async fn check_status(&self, task_id: &str) -> Result<StatusResponse, ApiError>;
}

#[async_trait]
impl GenerationApi for ApiClient {
    async fn submit(&self, request: &GenerateRequest) -> Result<SubmitResponse, ApiError> {
        ApiClient::submit(self, request).await
    }

    async fn check_status(&self, task_id: &str) -> Result<StatusResponse, ApiError> {
        ApiClient::check_status(self, task_id).await
    }
}

// ── State machine ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TaskPhase {
    Idle,
    Submitting,
    Polling { task_id: String, poll_count: u32 },
    Succeeded,
    Failed,
    TimedOut,
}

/// What to do after a poll response has been recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollVerdict {
    KeepPolling,
    Succeeded,
    Failed,
}

/// Transition table for one task. Pure state: the driver (or a test) calls
/// exactly one method per observed event.
#[derive(Debug)]
pub struct TaskMachine {
    phase: TaskPhase,
}

impl TaskMachine {
    pub fn new() -> Self {
        Self {
            phase: TaskPhase::Idle,
        }
    }

    pub fn phase(&self) -> &TaskPhase {
        &self.phase
    }

    pub fn begin_submit(&mut self) {
        self.phase = TaskPhase::Submitting;
    }

    pub fn submit_ok(&mut self, task_id: String) {
        self.phase = TaskPhase::Polling {
            task_id,
            poll_count: 0,
        };
    }

    pub fn submit_failed(&mut self) {
        self.phase = TaskPhase::Failed;
    }

    /// Whether the poll budget allows one more status check. Checked before
    /// every poll, so the loop terminates even against a backend that never
    /// reaches a terminal status.
    pub fn may_poll(&self) -> bool {
        matches!(&self.phase, TaskPhase::Polling { poll_count, .. } if *poll_count < MAX_POLLS)
    }

    pub fn time_out(&mut self) {
        self.phase = TaskPhase::TimedOut;
    }

    pub fn poll_count(&self) -> u32 {
        match &self.phase {
            TaskPhase::Polling { poll_count, .. } => *poll_count,
            _ => 0,
        }
    }

    /// The backend task id while polling.
    pub fn task_id(&self) -> Option<&str> {
        match &self.phase {
            TaskPhase::Polling { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    /// Record one status response. Success needs at least one result track;
    /// a success-class status without artifacts keeps the task polling until
    /// the artifacts arrive or the budget runs out.
    pub fn record_poll(&mut self, response: &StatusResponse) -> PollVerdict {
        if let TaskPhase::Polling { poll_count, .. } = &mut self.phase {
            *poll_count += 1;
        }
        if response.status.is_success() && !response.tracks.is_empty() {
            self.phase = TaskPhase::Succeeded;
            PollVerdict::Succeeded
        } else if response.status.is_failure() {
            self.phase = TaskPhase::Failed;
            PollVerdict::Failed
        } else {
            PollVerdict::KeepPolling
        }
    }

    pub fn poll_failed(&mut self) {
        self.phase = TaskPhase::Failed;
    }
}

impl Default for TaskMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// Results missing a creation timestamp get the capture time. Best-effort:
/// only the backend's own timestamp is authoritative.
pub fn stamp_missing_create_time(tracks: &mut [Track]) {
    let now = Utc::now();
    for track in tracks.iter_mut() {
        if track.create_time.is_none() {
            track.create_time = Some(now);
        }
    }
}

/// Drive one task from submission to a terminal outcome, reporting progress
/// through `events`. The next poll's wait starts only after the previous
/// round trip resolved, so at most one status request is in flight.
async fn run_task(
    api: Arc<dyn GenerationApi>,
    request: GenerateRequest,
    generation: u64,
    interval: Duration,
    events: mpsc::Sender<GenerationEvent>,
) {
    let finish = |outcome: TaskOutcome| {
        let events = events.clone();
        async move {
            let _ = events
                .send(GenerationEvent::Finished {
                    generation,
                    outcome,
                })
                .await;
        }
    };

    let mut machine = TaskMachine::new();
    machine.begin_submit();

    let task_id = match api.submit(&request).await {
        Ok(SubmitResponse {
            task_id: Some(task_id),
        }) if !task_id.is_empty() => {
            machine.submit_ok(task_id.clone());
            info!("[generation] task {} submitted", task_id);
            let _ = events
                .send(GenerationEvent::Submitted {
                    generation,
                    task_id: task_id.clone(),
                })
                .await;
            task_id
        }
        Ok(_) => {
            machine.submit_failed();
            warn!("[generation] backend accepted the request but returned no task id");
            finish(TaskOutcome::Failed(GenerationError::MissingTaskId)).await;
            return;
        }
        Err(e) => {
            machine.submit_failed();
            warn!("[generation] submit failed: {}", e);
            finish(TaskOutcome::Failed(GenerationError::Submit(e))).await;
            return;
        }
    };

    loop {
        if !machine.may_poll() {
            machine.time_out();
            warn!(
                "[generation] task {} timed out after {} polls",
                task_id, MAX_POLLS
            );
            finish(TaskOutcome::TimedOut).await;
            return;
        }

        tokio::time::sleep(interval).await;

        match api.check_status(&task_id).await {
            Ok(response) => match machine.record_poll(&response) {
                PollVerdict::KeepPolling => {
                    let _ = events
                        .send(GenerationEvent::Polled {
                            generation,
                            poll_count: machine.poll_count(),
                        })
                        .await;
                }
                PollVerdict::Succeeded => {
                    let mut tracks = response.tracks;
                    stamp_missing_create_time(&mut tracks);
                    info!(
                        "[generation] task {} succeeded with {} tracks",
                        task_id,
                        tracks.len()
                    );
                    finish(TaskOutcome::Succeeded { tracks }).await;
                    return;
                }
                PollVerdict::Failed => {
                    warn!("[generation] task {} reported failure", task_id);
                    finish(TaskOutcome::Failed(GenerationError::TaskFailed)).await;
                    return;
                }
            },
            Err(e) => {
                machine.poll_failed();
                warn!("[generation] status check for {} failed: {}", task_id, e);
                finish(TaskOutcome::Failed(GenerationError::PollTransport(e))).await;
                return;
            }
        }
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Owns at most one live task. A new submission cancels the previous task
/// first; overlapping poll loops for the same engine never exist.
pub struct GenerationEngine {
    api: Arc<dyn GenerationApi>,
    events: mpsc::Sender<GenerationEvent>,
    interval: Duration,
    generation: u64,
    driver: Option<JoinHandle<()>>,
    active: bool,
}

impl GenerationEngine {
    pub fn new(api: Arc<dyn GenerationApi>, events: mpsc::Sender<GenerationEvent>) -> Self {
        Self::with_interval(api, events, POLL_INTERVAL)
    }

    /// Tests inject a zero interval to drive the poll loop without real time.
    pub fn with_interval(
        api: Arc<dyn GenerationApi>,
        events: mpsc::Sender<GenerationEvent>,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            events,
            interval,
            generation: 0,
            driver: None,
            active: false,
        }
    }

    /// Start a new task. An empty prompt fails synchronously and starts
    /// nothing; otherwise any previous task is cancelled and a fresh driver
    /// task is spawned. Returns without waiting for task completion.
    pub fn submit(
        &mut self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<(), GenerationError> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        self.cancel();

        self.generation += 1;
        self.active = true;
        let request = options.to_request(prompt);
        info!(
            "[generation] submitting (gen {}, model {})",
            self.generation,
            request.model.label()
        );
        self.driver = Some(tokio::spawn(run_task(
            Arc::clone(&self.api),
            request,
            self.generation,
            self.interval,
            self.events.clone(),
        )));
        Ok(())
    }

    /// Stop the live task immediately. Idempotent; safe with no task active.
    /// The generation bump makes any already-queued event from the old task
    /// stale, so a late poll response cannot mutate anything.
    pub fn cancel(&mut self) {
        self.generation += 1;
        if let Some(driver) = self.driver.take() {
            driver.abort();
            info!("[generation] cancelled (gen now {})", self.generation);
        }
        self.active = false;
    }

    /// True while a task is between submission and an accepted terminal event.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Gatekeeper for incoming [`GenerationEvent`]s: false means the event
    /// belongs to a cancelled generation and must be discarded unprocessed.
    /// Accepting a terminal event releases the engine for the next submit.
    pub fn accept(&mut self, generation: u64, terminal: bool) -> bool {
        if generation != self.generation {
            return false;
        }
        if terminal {
            self.active = false;
            self.driver = None;
        }
        true
    }
}
