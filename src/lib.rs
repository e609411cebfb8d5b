pub mod capture;
pub mod config;
pub mod error;
pub mod export;
pub mod http;
pub mod orchestrator;
pub mod session;
pub mod transport;

pub use capture::{FrameRecorder, RawAudioFrame, RawVideoFrame, RecordingStats, RecordingWindow};
pub use config::Config;
pub use error::{CaptureError, ExportError, SessionError, TaskError, TransportError};
pub use export::{probe_video, ExportResult, Exporter, MuxOutcome, Muxer};
pub use http::{create_router, AppState};
pub use orchestrator::{OrchestratorStatus, TaskOrchestrator, TaskPhase, TaskReport};
pub use session::{CreateSessionOptions, Session, SessionClient, SessionConfig, TaskKind};
pub use transport::{ConnectParams, LoopbackConnector, LoopbackHandle, MediaConnector, RoomConnector};
