use super::state::{OrchestratorStatus, TaskPhase, TaskReport};
use crate::capture::FrameRecorder;
use crate::config::{CompletionStrategy, Config, TaskConfig};
use crate::error::{CaptureError, SessionError, TaskError};
use crate::export::{ExportResult, Exporter};
use crate::session::{
    spawn_keep_alive, CreateSessionOptions, Session, SessionClient, SessionConfig, TaskKind,
    TaskMode,
};
use crate::transport::{AvatarEvent, ConnectParams, MediaConnector, RoomConnector};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of [`TaskOrchestrator::interrupt`]
#[derive(Debug, Clone, Serialize)]
pub struct InterruptOutcome {
    /// Whether the remote interrupt call succeeded
    pub interrupted: bool,
    /// Whatever was captured before the interrupt
    pub partial: Option<ExportResult>,
}

/// State of the task in flight, shared with its [`TaskGuard`]
struct InFlight {
    processing: AtomicBool,
    cancelled: AtomicBool,
    cancel: Notify,
    phase: RwLock<TaskPhase>,
    current_task: RwLock<Option<String>>,
}

impl InFlight {
    fn new() -> Self {
        Self {
            processing: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            cancel: Notify::new(),
            phase: RwLock::new(TaskPhase::Idle),
            current_task: RwLock::new(None),
        }
    }

    async fn reset(&self) {
        *self.phase.write().await = TaskPhase::Idle;
        *self.current_task.write().await = None;
        self.cancelled.store(false, Ordering::SeqCst);
        self.processing.store(false, Ordering::SeqCst);
    }
}

/// Exclusive claim on the task slot.
///
/// If the task future is dropped before [`TaskGuard::release`], the open
/// recording window is discarded and the slot freed from a spawned task.
struct TaskGuard {
    in_flight: Arc<InFlight>,
    connector: Arc<MediaConnector>,
    armed: bool,
}

impl TaskGuard {
    fn acquire(in_flight: &Arc<InFlight>, connector: &Arc<MediaConnector>) -> Option<Self> {
        in_flight
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;

        Some(Self {
            in_flight: in_flight.clone(),
            connector: connector.clone(),
            armed: true,
        })
    }

    async fn release(mut self) {
        self.in_flight.reset().await;
        self.armed = false;
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let in_flight = self.in_flight.clone();
        let connector = self.connector.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Task abandoned before completion, releasing it");
                handle.spawn(async move {
                    discard_open_window(&connector).await;
                    in_flight.reset().await;
                });
            }
            Err(_) => in_flight.processing.store(false, Ordering::SeqCst),
        }
    }
}

/// Drives one speak task at a time through session, transport and capture
pub struct TaskOrchestrator {
    task_config: TaskConfig,
    keep_alive_interval: Duration,
    session: Arc<SessionClient>,
    connector: Arc<MediaConnector>,
    in_flight: Arc<InFlight>,
    last_report: RwLock<Option<TaskReport>>,
    keep_alive: Mutex<Option<JoinHandle<()>>>,
}

impl TaskOrchestrator {
    pub fn new(
        task_config: TaskConfig,
        keep_alive_interval: Duration,
        session: Arc<SessionClient>,
        connector: Arc<MediaConnector>,
    ) -> Self {
        Self {
            task_config,
            keep_alive_interval,
            session,
            connector,
            in_flight: Arc::new(InFlight::new()),
            last_report: RwLock::new(None),
            keep_alive: Mutex::new(None),
        }
    }

    /// Wire up the whole pipeline from configuration
    pub fn from_config(
        cfg: &Config,
        room_connector: Arc<dyn RoomConnector>,
    ) -> Result<Self, SessionError> {
        let session = Arc::new(SessionClient::new(SessionConfig::from_config(cfg))?);
        let recorder = Arc::new(FrameRecorder::new(Exporter::from_config(cfg)));
        let connector = Arc::new(MediaConnector::new(
            room_connector,
            recorder,
            cfg.connect_timeout(),
            cfg.transport.event_channel,
        ));

        Ok(Self::new(
            cfg.task.clone(),
            cfg.keep_alive_interval(),
            session,
            connector,
        ))
    }

    pub fn session(&self) -> &Arc<SessionClient> {
        &self.session
    }

    pub fn connector(&self) -> &Arc<MediaConnector> {
        &self.connector
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight.processing.load(Ordering::SeqCst)
    }

    /// Sweep, create and start a session.
    ///
    /// A session that fails to start is closed again. Creation failures never
    /// reach the start call.
    pub async fn open_session(&self, options: CreateSessionOptions) -> Result<Session, SessionError> {
        self.session.create_session(options).await?;

        if let Err(e) = self.session.start_session().await {
            error!("Failed to start session, closing it: {}", e);
            if let Err(close_err) = self.session.close_session().await {
                warn!("Failed to close unstarted session: {}", close_err);
            }
            return Err(e);
        }

        if !self.keep_alive_interval.is_zero() {
            let handle = spawn_keep_alive(self.session.clone(), self.keep_alive_interval);
            if let Some(previous) = self.keep_alive.lock().await.replace(handle) {
                previous.abort();
            }
        }

        Ok(self.session.snapshot().await)
    }

    /// Run one speak task end to end.
    ///
    /// Only a concurrent call is an error; every other failure is logged and
    /// yields `Ok(None)`. Dropping the returned future mid-task releases the
    /// slot and discards whatever was being recorded.
    pub async fn process_text_task(
        &self,
        text: &str,
        kind: TaskKind,
    ) -> Result<Option<PathBuf>, TaskError> {
        let Some(guard) = TaskGuard::acquire(&self.in_flight, &self.connector) else {
            warn!("Rejecting task: another task is in flight");
            return Err(TaskError::AlreadyProcessing);
        };

        let task_id = format!("task-{}", Uuid::new_v4());
        self.in_flight.cancelled.store(false, Ordering::SeqCst);
        *self.in_flight.current_task.write().await = Some(task_id.clone());

        let mut report = TaskReport::new(task_id.clone(), text, kind);
        let outcome = self.run_task(text, kind, &mut report).await;

        let path = match outcome {
            Ok(path) => {
                info!("Task {} produced {:?}", task_id, path);
                Some(path)
            }
            Err(e) => {
                error!("Task {} failed: {}", task_id, e);
                if matches!(e, TaskError::Interrupted) {
                    report.interrupted = true;
                }
                report.error = Some(e.to_string());
                discard_open_window(&self.connector).await;
                None
            }
        };

        report.finished_at = Some(chrono::Utc::now());
        *self.last_report.write().await = Some(report);
        guard.release().await;

        Ok(path)
    }

    async fn run_task(
        &self,
        text: &str,
        kind: TaskKind,
        report: &mut TaskReport,
    ) -> Result<PathBuf, TaskError> {
        if !self.connector.is_connected() {
            self.enter(TaskPhase::Connecting, report).await;
            self.ensure_connected().await?;
        }
        self.check_cancelled()?;

        self.enter(TaskPhase::Recording, report).await;
        self.connector.start_recording(&report.task_id).await?;

        let mut events = self.connector.subscribe_events();

        self.check_cancelled()?;
        self.enter(TaskPhase::Dispatched, report).await;
        let info = self
            .session
            .dispatch_task(text, kind, TaskMode::Sync)
            .await?;
        report.vendor_task_id = info.task_id.clone();

        let estimated_ms = match info.duration_ms {
            Some(ms) if ms > self.task_config.max_duration_ms => {
                warn!(
                    "Estimate of {}ms exceeds the {}ms ceiling, clamping",
                    ms, self.task_config.max_duration_ms
                );
                self.task_config.max_duration_ms
            }
            Some(ms) => ms,
            None => self.task_config.default_duration_ms,
        };
        let wait = Duration::from_millis(
            estimated_ms.saturating_add(self.task_config.safety_margin_ms),
        );
        report.estimated_duration_ms = Some(estimated_ms);
        report.wait_ms = Some(wait.as_millis() as u64);

        self.enter(TaskPhase::Waiting, report).await;
        info!(
            "Waiting {:?} for task {} (estimate {}ms)",
            wait, report.task_id, estimated_ms
        );
        self.wait_for_completion(wait, &mut events, info.task_id.as_deref())
            .await?;

        self.enter(TaskPhase::Stopped, report).await;
        let stopped = self.connector.stop_recording().await;
        if let Some(timing) = self.connector.recorder().last_timing().await {
            report.set_recording_window(timing.opened, timing.closed);
        }
        let result = stopped?.ok_or(CaptureError::NoMediaCaptured)?;

        let path = result.path.clone();
        report.output = Some(result.clone());
        self.validate_output(&result)?;

        self.enter(TaskPhase::Exported, report).await;
        Ok(path)
    }

    fn check_cancelled(&self) -> Result<(), TaskError> {
        if self.in_flight.cancelled.load(Ordering::SeqCst) {
            return Err(TaskError::Interrupted);
        }
        Ok(())
    }

    async fn ensure_connected(&self) -> Result<(), TaskError> {
        let session = self.session.snapshot().await;
        if !session.active {
            return Err(SessionError::NotActive.into());
        }

        let (Some(url), Some(token)) = (session.url.clone(), session.access_token.clone()) else {
            return Err(SessionError::NotActive.into());
        };

        self.connector
            .connect(&ConnectParams {
                url,
                token,
                session_id: session.session_id.clone(),
                control_url: Some(self.session.base_url().to_string()),
            })
            .await?;

        Ok(())
    }

    async fn wait_for_completion(
        &self,
        wait: Duration,
        events: &mut broadcast::Receiver<AvatarEvent>,
        vendor_task_id: Option<&str>,
    ) -> Result<(), TaskError> {
        let cancelled = self.in_flight.cancel.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        self.check_cancelled()?;

        match self.task_config.completion {
            CompletionStrategy::Fixed => {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => Ok(()),
                    _ = &mut cancelled => Err(TaskError::Interrupted),
                }
            }
            CompletionStrategy::Event => {
                let tail = Duration::from_millis(self.task_config.event_tail_ms);
                tokio::select! {
                    finished = tokio::time::timeout(wait, speech_ended(events, vendor_task_id)) => {
                        match finished {
                            Ok(()) => {
                                debug!("Speech end reported, recording tail of {:?}", tail);
                                tokio::select! {
                                    _ = tokio::time::sleep(tail) => Ok(()),
                                    _ = &mut cancelled => Err(TaskError::Interrupted),
                                }
                            }
                            Err(_) => {
                                warn!("No completion event within {:?}, stopping on timer", wait);
                                Ok(())
                            }
                        }
                    }
                    _ = &mut cancelled => Err(TaskError::Interrupted),
                }
            }
        }
    }

    fn validate_output(&self, result: &ExportResult) -> Result<(), TaskError> {
        let path = &result.path;
        let size = std::fs::metadata(path)
            .map_err(|e| TaskError::OutputRejected(format!("{}: {}", path.display(), e)))?
            .len();

        if size <= self.task_config.min_output_bytes {
            result.remove_files();
            return Err(TaskError::OutputRejected(format!(
                "{} is only {} bytes",
                path.display(),
                size
            )));
        }

        Ok(())
    }

    /// Stop the current task.
    ///
    /// The recording window is closed and exported before the remote
    /// interrupt is sent, so frames already buffered are kept.
    pub async fn interrupt(&self) -> InterruptOutcome {
        let partial = if self.connector.recorder().is_recording() {
            info!("Interrupt: stopping recording");
            match self.connector.stop_recording().await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Interrupt: export of partial capture failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let interrupted = self.session.interrupt().await;

        if self.is_processing() {
            self.in_flight.cancelled.store(true, Ordering::SeqCst);
            self.in_flight.cancel.notify_waiters();
            *self.in_flight.phase.write().await = TaskPhase::Stopped;
        }

        InterruptOutcome {
            interrupted,
            partial,
        }
    }

    /// Tear everything down: in-flight task, transport, keep-alive, session
    pub async fn shutdown(&self) {
        info!("Shutting down orchestrator");

        if self.is_processing() {
            let outcome = self.interrupt().await;
            if let Some(partial) = outcome.partial {
                info!("Partial capture saved to {:?}", partial.path);
            }
        }

        if let Some(result) = self.connector.disconnect().await {
            info!("Capture flushed on disconnect: {:?}", result.path);
        }

        if let Some(handle) = self.keep_alive.lock().await.take() {
            handle.abort();
        }

        if let Err(e) = self.session.close_session().await {
            error!("Failed to close session during shutdown: {}", e);
        }
    }

    pub async fn last_report(&self) -> Option<TaskReport> {
        self.last_report.read().await.clone()
    }

    pub async fn phase(&self) -> TaskPhase {
        *self.in_flight.phase.read().await
    }

    pub async fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            processing: self.is_processing(),
            phase: self.phase().await,
            current_task_id: self.in_flight.current_task.read().await.clone(),
            session: self.session.snapshot().await,
            transport_connected: self.connector.is_connected(),
            recording: self.connector.recording_stats().await,
            last_report: self.last_report().await,
        }
    }

    async fn enter(&self, phase: TaskPhase, report: &mut TaskReport) {
        debug!("Task {} -> {:?}", report.task_id, phase);
        *self.in_flight.phase.write().await = phase;
        report.phases.push(phase);
    }
}

async fn discard_open_window(connector: &MediaConnector) {
    if !connector.recorder().is_recording() {
        return;
    }

    match connector.stop_recording().await {
        Ok(Some(result)) => {
            warn!("Discarding capture of failed task: {:?}", result.path);
            result.remove_files();
        }
        Ok(None) => {}
        Err(e) => debug!("Nothing exported for failed task: {}", e),
    }
}

async fn speech_ended(events: &mut broadcast::Receiver<AvatarEvent>, vendor_task_id: Option<&str>) {
    loop {
        match events.recv().await {
            Ok(AvatarEvent::TaskFinished { task_id }) => {
                match (task_id.as_deref(), vendor_task_id) {
                    (Some(finished), Some(ours)) if finished != ours => {
                        debug!("Ignoring completion of task {}", finished);
                    }
                    _ => return,
                }
            }
            Ok(event) if event.ends_speech() => return,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Event receiver lagged by {}", skipped);
            }
            // Channel gone: leave it to the timer
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}
