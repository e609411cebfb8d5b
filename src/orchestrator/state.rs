use crate::capture::RecordingStats;
use crate::export::ExportResult;
use crate::session::{Session, TaskKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

/// Where the in-flight task is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Idle,
    Connecting,
    Recording,
    Dispatched,
    Waiting,
    Stopped,
    Exported,
}

/// Record of one `process_text_task` call
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    /// Id the vendor assigned, when it sent one
    pub vendor_task_id: Option<String>,
    pub kind: TaskKind,
    pub text_preview: String,
    /// Phases in the order they were entered
    pub phases: Vec<TaskPhase>,
    pub estimated_duration_ms: Option<u64>,
    /// Wait actually scheduled between dispatch and stop
    pub wait_ms: Option<u64>,
    #[serde(skip)]
    pub recording_started: Option<Instant>,
    #[serde(skip)]
    pub recording_stopped: Option<Instant>,
    pub recording_ms: Option<u64>,
    pub output: Option<ExportResult>,
    pub interrupted: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskReport {
    pub(crate) fn new(task_id: String, text: &str, kind: TaskKind) -> Self {
        Self {
            task_id,
            vendor_task_id: None,
            kind,
            text_preview: text.chars().take(50).collect(),
            phases: vec![TaskPhase::Idle],
            estimated_duration_ms: None,
            wait_ms: None,
            recording_started: None,
            recording_stopped: None,
            recording_ms: None,
            output: None,
            interrupted: false,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.output.is_some()
    }

    pub(crate) fn set_recording_window(&mut self, opened: Instant, closed: Instant) {
        self.recording_started = Some(opened);
        self.recording_stopped = Some(closed);
        self.recording_ms = Some(closed.duration_since(opened).as_millis() as u64);
    }
}

/// Snapshot served by `GET /status`
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub processing: bool,
    pub phase: TaskPhase,
    pub current_task_id: Option<String>,
    pub session: Session,
    pub transport_connected: bool,
    pub recording: RecordingStats,
    pub last_report: Option<TaskReport>,
}
