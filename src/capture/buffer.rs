use super::frame::{AudioFrame, RawAudioFrame, RawVideoFrame, VideoFrame};
use crate::error::CaptureError;
use crate::export::{ExportResult, Exporter};
use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::RgbImage;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Media retained for one task
#[derive(Debug)]
pub struct RecordingWindow {
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    pub opened: Instant,
    /// Set when the window is closed
    pub closed: Option<Instant>,
    pub video: Vec<VideoFrame>,
    pub audio: Vec<AudioFrame>,
}

impl RecordingWindow {
    fn new(task_id: String) -> Self {
        Self {
            task_id,
            started_at: Utc::now(),
            opened: Instant::now(),
            closed: None,
            video: Vec::new(),
            audio: Vec::new(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.closed
            .unwrap_or_else(Instant::now)
            .duration_since(self.opened)
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }
}

/// Snapshot of the recorder for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct RecordingStats {
    pub is_recording: bool,
    pub current_task_id: Option<String>,
    pub video_frames: usize,
    pub audio_frames: usize,
    pub elapsed_secs: f64,
    /// Frames that arrived while no window was open
    pub frames_dropped: usize,
}

/// Timing of the last closed window
#[derive(Debug, Clone, Copy)]
pub struct WindowTiming {
    pub opened: Instant,
    pub closed: Instant,
}

/// Frame capture buffer.
///
/// Track workers push frames at any time; they are kept only between
/// `start_recording` and `stop_recording`. Closing the window happens under
/// the same lock appends take, so nothing lands after `stop_recording` returns.
pub struct FrameRecorder {
    exporter: Exporter,
    recording: AtomicBool,
    window: Mutex<Option<RecordingWindow>>,
    last_timing: Mutex<Option<WindowTiming>>,
    frames_dropped: AtomicUsize,
}

impl FrameRecorder {
    pub fn new(exporter: Exporter) -> Self {
        Self {
            exporter,
            recording: AtomicBool::new(false),
            window: Mutex::new(None),
            last_timing: Mutex::new(None),
            frames_dropped: AtomicUsize::new(0),
        }
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Open a window for `task_id`. Rejected while another window is open.
    pub async fn start_recording(&self, task_id: &str) -> Result<String, CaptureError> {
        let mut window = self.window.lock().await;
        if let Some(open) = window.as_ref() {
            warn!("Recording already in progress for task {}", open.task_id);
            return Err(CaptureError::WindowAlreadyOpen(open.task_id.clone()));
        }

        *window = Some(RecordingWindow::new(task_id.to_string()));
        self.recording.store(true, Ordering::SeqCst);
        info!("Recording started for task: {}", task_id);

        Ok(task_id.to_string())
    }

    /// Append a video frame if a window is open
    pub async fn on_video_frame(&self, frame: RawVideoFrame) {
        if !self.is_recording() {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let captured_at = Utc::now();
        let Some(rgb) = frame.to_rgb24() else {
            warn!(
                "Dropping malformed {:?} frame {}x{} ({} bytes)",
                frame.format,
                frame.width,
                frame.height,
                frame.data.len()
            );
            return;
        };

        let mut guard = self.window.lock().await;
        let Some(window) = guard.as_mut() else {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let mut normalized = VideoFrame {
            width: frame.width,
            height: frame.height,
            rgb,
            captured_at,
        };

        if let Some(first) = window.video.first() {
            if (first.width, first.height) != (normalized.width, normalized.height) {
                match resize(&normalized, first.width, first.height) {
                    Some(resized) => normalized = resized,
                    None => return,
                }
            }
        }

        window.video.push(normalized);
        debug!(
            "Captured video frame {}x{} (#{})",
            frame.width,
            frame.height,
            window.video.len()
        );
    }

    /// Append an audio frame if a window is open
    pub async fn on_audio_frame(&self, frame: RawAudioFrame) {
        if !self.is_recording() {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let normalized = AudioFrame {
            samples: frame.to_i16(),
            sample_rate: frame.sample_rate,
            channels: frame.channels,
            captured_at: Utc::now(),
        };

        let mut guard = self.window.lock().await;
        match guard.as_mut() {
            Some(window) => window.audio.push(normalized),
            None => {
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Close the window and export what it captured.
    ///
    /// Returns `Ok(None)` when nothing was captured at all.
    pub async fn stop_recording(&self) -> Result<Option<ExportResult>, CaptureError> {
        let window = {
            let mut guard = self.window.lock().await;
            self.recording.store(false, Ordering::SeqCst);
            guard.take()
        };

        let Some(mut window) = window else {
            warn!("Recording is not active");
            return Err(CaptureError::NotRecording);
        };

        let closed = Instant::now();
        window.closed = Some(closed);
        *self.last_timing.lock().await = Some(WindowTiming {
            opened: window.opened,
            closed,
        });

        info!(
            "Recording stopped for task {}: {} video / {} audio frames over {:.1}s",
            window.task_id,
            window.video.len(),
            window.audio.len(),
            window.elapsed().as_secs_f64()
        );

        if window.is_empty() {
            warn!("No frames captured for task {}", window.task_id);
            return Ok(None);
        }

        let result = self.exporter.export(window).await?;
        Ok(Some(result))
    }

    /// Timing of the most recently closed window
    pub async fn last_timing(&self) -> Option<WindowTiming> {
        *self.last_timing.lock().await
    }

    pub async fn stats(&self) -> RecordingStats {
        let window = self.window.lock().await;
        RecordingStats {
            is_recording: self.is_recording(),
            current_task_id: window.as_ref().map(|w| w.task_id.clone()),
            video_frames: window.as_ref().map_or(0, |w| w.video.len()),
            audio_frames: window.as_ref().map_or(0, |w| w.audio.len()),
            elapsed_secs: window.as_ref().map_or(0.0, |w| w.elapsed().as_secs_f64()),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

fn resize(frame: &VideoFrame, width: u32, height: u32) -> Option<VideoFrame> {
    let Some(image) = RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone()) else {
        warn!("Dropping frame with inconsistent buffer size");
        return None;
    };

    let resized = image::imageops::resize(&image, width, height, FilterType::Triangle);
    Some(VideoFrame {
        width,
        height,
        rgb: resized.into_raw(),
        captured_at: frame.captured_at,
    })
}
