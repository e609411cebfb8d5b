use super::avi::write_video;
use super::mux::{MuxOutcome, Muxer};
use super::wav::write_audio;
use crate::capture::RecordingWindow;
use crate::config::Config;
use crate::error::ExportError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Output settings for exported recordings
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub output_dir: PathBuf,
    /// Extension of the combined file
    pub video_format: String,
    /// Frame rate written into the video header
    pub target_fps: u32,
    pub jpeg_quality: u8,
}

impl ExportSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            output_dir: cfg.output_dir(),
            video_format: cfg.capture.video_format.clone(),
            target_fps: cfg.capture.target_fps,
            jpeg_quality: cfg.capture.jpeg_quality,
        }
    }
}

/// Exported file for one recording window
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub task_id: String,
    pub path: PathBuf,
    /// False when the file is the video-only fallback
    pub has_audio: bool,
    pub video_frames: usize,
    pub audio_frames: usize,
    pub audio_frames_dropped: usize,
    /// Video length implied by the frame count and target frame rate
    pub duration_secs: f64,
    /// Why muxing was skipped, if it was
    pub degraded_reason: Option<String>,
    /// Audio intermediate kept beside a video-only file
    pub audio_path: Option<PathBuf>,
}

impl ExportResult {
    /// Delete every file this export left on disk
    pub fn remove_files(&self) {
        remove_intermediate(&self.path);
        if let Some(audio) = &self.audio_path {
            remove_intermediate(audio);
        }
    }
}

/// Writes a closed recording window to disk
pub struct Exporter {
    settings: ExportSettings,
    muxer: Muxer,
}

impl Exporter {
    pub fn new(settings: ExportSettings, muxer: Muxer) -> Self {
        Self { settings, muxer }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let muxer = Muxer::locate(
            cfg.capture.ffmpeg_path.as_deref(),
            std::time::Duration::from_secs(cfg.capture.mux_timeout_secs),
        );
        Self::new(ExportSettings::from_config(cfg), muxer)
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn muxer(&self) -> &Muxer {
        &self.muxer
    }

    /// Encode video and audio, then try to combine them.
    ///
    /// A missing or failing muxer is not an error: the video-only file is
    /// returned with `has_audio = false`.
    pub async fn export(&self, window: RecordingWindow) -> Result<ExportResult, ExportError> {
        if window.video.is_empty() {
            warn!(
                "No video frames for task {} ({} audio frames discarded)",
                window.task_id,
                window.audio.len()
            );
            return Err(ExportError::NoVideoCaptured);
        }

        std::fs::create_dir_all(&self.settings.output_dir)?;

        let base = output_base(&window);
        let video_path = self
            .settings
            .output_dir
            .join(format!("{}_video_only.avi", base));
        let audio_path = self.settings.output_dir.join(format!("{}.wav", base));
        let output_path = self
            .settings
            .output_dir
            .join(format!("{}.{}", base, self.settings.video_format));

        let task_id = window.task_id.clone();
        let video_frames = window.video.len();
        let audio_frames = window.audio.len();
        let fps = self.settings.target_fps.max(1);
        let quality = self.settings.jpeg_quality;

        let written = {
            let video_path = video_path.clone();
            let audio_path = audio_path.clone();
            tokio::task::spawn_blocking(move || {
                let video = write_video(&video_path, &window.video, fps, quality)?;
                let audio = write_audio(&audio_path, &window.audio)?;
                Ok::<_, ExportError>((video, audio))
            })
            .await
            .map_err(|e| ExportError::Worker(e.to_string()))
            .and_then(|written| written)
        };

        let (video_path, audio) = match written {
            Ok(written) => written,
            Err(e) => {
                warn!("Export of task {} failed, removing partial files: {}", task_id, e);
                remove_partial(&video_path);
                remove_partial(&audio_path);
                return Err(e);
            }
        };

        let duration_secs = video_frames as f64 / fps as f64;
        let mut result = ExportResult {
            task_id,
            path: video_path.clone(),
            has_audio: false,
            video_frames,
            audio_frames,
            audio_frames_dropped: audio.as_ref().map_or(0, |a| a.frames_dropped),
            duration_secs,
            degraded_reason: None,
            audio_path: None,
        };

        let audio = match audio {
            Some(meta) if meta.frames_written > 0 => meta,
            _ => {
                warn!("No usable audio for task {}, exporting video only", result.task_id);
                result.degraded_reason = Some("no audio captured".to_string());
                return Ok(result);
            }
        };

        match self
            .muxer
            .mux(&video_path, &audio.file_path, &output_path)
            .await
        {
            MuxOutcome::Combined(path) => {
                remove_intermediate(&video_path);
                remove_intermediate(&audio.file_path);
                result.path = path;
                result.has_audio = true;
            }
            MuxOutcome::Degraded(reason) => {
                warn!("Mux skipped for task {}: {}", result.task_id, reason);
                result.degraded_reason = Some(reason);
                result.audio_path = Some(audio.file_path.clone());
            }
        }

        info!(
            "Exported task {} to {:?} ({} video / {} audio frames, audio: {})",
            result.task_id, result.path, video_frames, audio_frames, result.has_audio
        );

        Ok(result)
    }
}

fn output_base(window: &RecordingWindow) -> String {
    let task_id: String = window
        .task_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "avatar_response_{}_{}",
        window.started_at.format("%Y%m%d_%H%M%S"),
        task_id
    )
}

fn remove_partial(path: &Path) {
    if path.is_file() {
        remove_intermediate(path);
    }
}

fn remove_intermediate(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove intermediate {:?}: {}", path, e);
    }
}
