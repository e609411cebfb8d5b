// Shared test fixtures: an in-process fake of the vendor control API and
// helpers to build a pipeline around it with the loopback room.

#![allow(dead_code)]

use anyhow::Result;
use avatar_recorder::capture::{PixelFormat, SampleData};
use avatar_recorder::config::{CompletionStrategy, TaskConfig};
use avatar_recorder::export::{ExportSettings, Exporter, Muxer};
use avatar_recorder::{
    FrameRecorder, LoopbackConnector, LoopbackHandle, MediaConnector, RawAudioFrame,
    RawVideoFrame, SessionClient, SessionConfig, TaskOrchestrator,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shape `streaming.list` answers with
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListShape {
    Bare,
    Data,
    DataSessions,
    Garbage,
}

/// Observable state of the fake control plane
pub struct VendorState {
    pub sessions: Mutex<Vec<String>>,
    pub list_shape: Mutex<ListShape>,
    pub task_duration_ms: Mutex<Option<u64>>,
    pub fail_create: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_task: AtomicBool,
    pub created: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub task_calls: AtomicUsize,
    pub interrupt_calls: AtomicUsize,
    pub keep_alive_calls: AtomicUsize,
    pub last_create_body: Mutex<Option<Value>>,
    pub seen_api_keys: Mutex<Vec<String>>,
}

impl Default for VendorState {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            list_shape: Mutex::new(ListShape::DataSessions),
            task_duration_ms: Mutex::new(Some(3000)),
            fail_create: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            fail_task: AtomicBool::new(false),
            created: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            task_calls: AtomicUsize::new(0),
            interrupt_calls: AtomicUsize::new(0),
            keep_alive_calls: AtomicUsize::new(0),
            last_create_body: Mutex::new(None),
            seen_api_keys: Mutex::new(Vec::new()),
        }
    }
}

impl VendorState {
    pub fn remote_sessions(&self) -> Vec<String> {
        self.sessions.lock().unwrap().clone()
    }

    /// A session left behind by some earlier process
    pub fn seed_session(&self, id: &str) {
        self.sessions.lock().unwrap().push(id.to_string());
    }

    pub fn set_list_shape(&self, shape: ListShape) {
        *self.list_shape.lock().unwrap() = shape;
    }

    pub fn set_task_duration(&self, duration_ms: Option<u64>) {
        *self.task_duration_ms.lock().unwrap() = duration_ms;
    }
}

/// Running fake vendor API
pub struct FakeVendor {
    pub base_url: String,
    pub state: Arc<VendorState>,
}

impl FakeVendor {
    pub async fn start() -> Result<Self> {
        let state = Arc::new(VendorState::default());

        let app = Router::new()
            .route("/v1/streaming.list", get(list_sessions))
            .route("/v1/streaming.new", post(new_session))
            .route("/v1/streaming.start", post(start_session))
            .route("/v1/streaming.task", post(task))
            .route("/v1/streaming.interrupt", post(interrupt))
            .route("/v1/streaming.keep_alive", post(keep_alive))
            .route("/v1/streaming.stop", post(stop_session))
            .route("/v1/streaming/avatar.list", get(avatars))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url: format!("http://{}/v1", addr),
            state,
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            api_key: "test-key".to_string(),
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_secs(5),
            ..SessionConfig::default()
        }
    }

    pub fn client(&self) -> Result<SessionClient> {
        Ok(SessionClient::new(self.session_config())?)
    }
}

fn record_key(state: &VendorState, headers: &axum::http::HeaderMap) {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        state.seen_api_keys.lock().unwrap().push(key.to_string());
    }
}

fn session_id_of(body: &Value) -> Option<String> {
    body.get("session_id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

async fn list_sessions(
    State(state): State<Arc<VendorState>>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    record_key(&state, &headers);
    let entries: Vec<Value> = state
        .remote_sessions()
        .into_iter()
        .map(|id| json!({ "session_id": id, "status": "connected" }))
        .collect();

    let body = match *state.list_shape.lock().unwrap() {
        ListShape::Bare => json!(entries),
        ListShape::Data => json!({ "code": 100, "data": entries }),
        ListShape::DataSessions => json!({ "code": 100, "data": { "sessions": entries } }),
        ListShape::Garbage => json!({ "code": 100, "data": { "total": entries.len() } }),
    };
    Json(body)
}

async fn new_session(
    State(state): State<Arc<VendorState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    record_key(&state, &headers);
    *state.last_create_body.lock().unwrap() = Some(body);

    if state.fail_create.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "code": 500, "message": "quota exceeded" })),
        )
            .into_response();
    }

    let n = state.created.fetch_add(1, Ordering::SeqCst) + 1;
    let id = format!("sess-{}", n);
    state.sessions.lock().unwrap().push(id.clone());

    Json(json!({
        "code": 100,
        "data": {
            "session_id": id,
            "url": "loopback://room",
            "access_token": format!("token-{}", n),
            "session_duration_limit": 600,
            "realtime_endpoint": "wss://realtime.test"
        }
    }))
    .into_response()
}

async fn start_session(
    State(state): State<Arc<VendorState>>,
    Json(_body): Json<Value>,
) -> impl IntoResponse {
    state.start_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_start.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": 400, "message": "cannot start" })),
        )
            .into_response();
    }
    Json(json!({ "code": 100, "data": null })).into_response()
}

async fn task(State(state): State<Arc<VendorState>>, Json(_body): Json<Value>) -> impl IntoResponse {
    let n = state.task_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if state.fail_task.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "code": 502, "message": "renderer busy" })),
        )
            .into_response();
    }

    let duration = *state.task_duration_ms.lock().unwrap();
    let data = match duration {
        Some(ms) => json!({ "task_id": format!("vendor-task-{}", n), "duration_ms": ms }),
        None => json!({ "task_id": format!("vendor-task-{}", n) }),
    };
    Json(json!({ "code": 100, "data": data })).into_response()
}

async fn interrupt(State(state): State<Arc<VendorState>>) -> impl IntoResponse {
    state.interrupt_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "code": 100 }))
}

async fn keep_alive(State(state): State<Arc<VendorState>>) -> impl IntoResponse {
    state.keep_alive_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "code": 100 }))
}

async fn stop_session(
    State(state): State<Arc<VendorState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.stop_calls.fetch_add(1, Ordering::SeqCst);
    let Some(id) = session_id_of(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": 400, "message": "missing session_id" })),
        )
            .into_response();
    };
    state.sessions.lock().unwrap().retain(|s| s != &id);
    Json(json!({ "code": 100 })).into_response()
}

async fn avatars() -> impl IntoResponse {
    Json(json!({
        "code": 100,
        "data": [
            { "avatar_id": "Anna_public", "normal_preview": "https://example.test/a.png" },
            { "avatar_id": "Wayne_public" }
        ]
    }))
}

// ============================================================================
// Pipeline helpers
// ============================================================================

pub fn exporter(output_dir: &Path, muxer: Muxer) -> Exporter {
    Exporter::new(
        ExportSettings {
            output_dir: output_dir.to_path_buf(),
            video_format: "mkv".to_string(),
            target_fps: 30,
            jpeg_quality: 80,
        },
        muxer,
    )
}

/// Muxer found on PATH, or `None` when this machine has no ffmpeg
pub fn system_muxer() -> Option<Muxer> {
    let muxer = Muxer::locate(None, Duration::from_secs(30));
    muxer.is_available().then_some(muxer)
}

pub fn task_config(safety_margin_ms: u64) -> TaskConfig {
    TaskConfig {
        safety_margin_ms,
        default_duration_ms: 1000,
        max_duration_ms: 60_000,
        min_output_bytes: 1024,
        completion: CompletionStrategy::Fixed,
        event_tail_ms: 100,
    }
}

pub struct Pipeline {
    pub vendor: FakeVendor,
    pub orchestrator: Arc<TaskOrchestrator>,
    pub room: LoopbackHandle,
}

pub async fn pipeline(output_dir: &Path, task: TaskConfig, muxer: Muxer) -> Result<Pipeline> {
    let vendor = FakeVendor::start().await?;
    let session = Arc::new(vendor.client()?);

    let (loopback, room) = LoopbackConnector::new();
    let connector = Arc::new(MediaConnector::new(
        Arc::new(loopback),
        Arc::new(FrameRecorder::new(exporter(output_dir, muxer))),
        Duration::from_secs(2),
        false,
    ));

    let orchestrator = Arc::new(TaskOrchestrator::new(
        task,
        Duration::ZERO,
        session,
        connector,
    ));

    Ok(Pipeline {
        vendor,
        orchestrator,
        room,
    })
}

// ============================================================================
// Synthetic media
// ============================================================================

/// Packed RGB frame with a moving gradient so JPEG output is not trivial
pub fn video_frame(width: u32, height: u32, index: u32) -> RawVideoFrame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push(((x + index * 3) % 256) as u8);
            data.push(((y + index) % 256) as u8);
            data.push(((x + y) % 256) as u8);
        }
    }
    RawVideoFrame {
        width,
        height,
        format: PixelFormat::Rgb24,
        data,
    }
}

/// 10ms of a 440Hz tone at 48kHz mono
pub fn audio_frame(index: u32) -> RawAudioFrame {
    let samples = (0..480)
        .map(|i| {
            let t = (index * 480 + i) as f32 / 48_000.0;
            (t * 440.0 * std::f32::consts::TAU).sin() * 0.5
        })
        .collect();
    RawAudioFrame {
        sample_rate: 48_000,
        channels: 1,
        samples: SampleData::F32(samples),
    }
}

/// Poll until `check` holds or `timeout` passes
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}

/// Publishes a video and an audio track as soon as the room is joined and
/// streams frames until stopped
pub struct Feeder {
    stop: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<usize>,
}

impl Feeder {
    pub fn spawn(room: LoopbackHandle, width: u32, height: u32) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        let handle = tokio::spawn(async move {
            while !room.is_connected() {
                if flag.load(Ordering::SeqCst) {
                    return 0;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }

            let Ok(video) = room.publish_video("avatar", "TR_video").await else {
                return 0;
            };
            let Ok(audio) = room.publish_audio("avatar", "TR_audio").await else {
                return 0;
            };

            let mut sent = 0u32;
            while !flag.load(Ordering::SeqCst) {
                if !video.send(video_frame(width, height, sent)).await {
                    break;
                }
                // 20ms of audio per video frame
                for i in 0..2 {
                    if !audio.send(audio_frame(sent * 2 + i)).await {
                        break;
                    }
                }
                sent += 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            sent as usize
        });

        Self { stop, handle }
    }

    /// Stop streaming and return how many video frames were sent
    pub async fn stop(self) -> usize {
        self.stop.store(true, Ordering::SeqCst);
        self.handle.await.unwrap_or(0)
    }
}
