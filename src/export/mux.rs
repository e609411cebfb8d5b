use ffmpeg_sidecar::command::FfmpegCommand;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of combining the intermediate files
#[derive(Debug, Clone, PartialEq)]
pub enum MuxOutcome {
    /// Combined file written at the given path
    Combined(PathBuf),
    /// Muxer missing or failed; the video-only file stands
    Degraded(String),
}

/// External `ffmpeg` invocation
#[derive(Debug, Clone)]
pub struct Muxer {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl Muxer {
    /// Resolve the binary from an explicit path or `ffmpeg` on PATH
    pub fn locate(override_path: Option<&str>, timeout: Duration) -> Self {
        let binary = match override_path {
            Some(path) if Path::new(path).is_file() => Some(PathBuf::from(path)),
            Some(path) => match which::which(path) {
                Ok(found) => Some(found),
                Err(e) => {
                    warn!("Configured muxer {} not usable: {}", path, e);
                    None
                }
            },
            None => which::which("ffmpeg").ok(),
        };

        match &binary {
            Some(path) => debug!("Using muxer at {:?}", path),
            None => warn!("ffmpeg not found, exports will be video-only"),
        }

        Self { binary, timeout }
    }

    /// Muxer that always degrades
    pub fn unavailable() -> Self {
        Self {
            binary: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }

    /// Copy the video stream, encode audio to AAC, stop at the shorter stream
    pub async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> MuxOutcome {
        let Some(binary) = &self.binary else {
            return MuxOutcome::Degraded("muxer not available".to_string());
        };

        let spawned = {
            let mut command = FfmpegCommand::new_with_path(binary);
            command
                .args(["-loglevel", "error"])
                .args(["-i", video.to_string_lossy().as_ref()])
                .args(["-i", audio.to_string_lossy().as_ref()])
                .args(["-map", "0:v"])
                .args(["-map", "1:a"])
                .args(["-c:v", "copy"])
                .args(["-c:a", "aac"])
                .args(["-shortest"])
                .args(["-y"])
                .arg(output.to_string_lossy().to_string());

            let inner_command = command.as_inner_mut();
            inner_command.stdin(Stdio::null());
            inner_command.stdout(Stdio::null());
            inner_command.stderr(Stdio::piped());

            inner_command.spawn()
        };

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return MuxOutcome::Degraded(format!("failed to start muxer: {}", e)),
        };

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    if let Err(e) = child.kill() {
                        warn!("Failed to kill muxer: {}", e);
                    }
                    let _ = child.wait();
                    let _ = std::fs::remove_file(output);
                    return MuxOutcome::Degraded(format!(
                        "muxer timed out after {:?}",
                        self.timeout
                    ));
                }
                Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
                Err(e) => return MuxOutcome::Degraded(format!("muxer wait failed: {}", e)),
            }
        };

        let mut stderr_output = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_string(&mut stderr_output);
        }

        if !status.success() {
            let _ = std::fs::remove_file(output);
            let detail = stderr_output
                .lines()
                .last()
                .map(str::to_string)
                .unwrap_or_else(|| format!("exit code {:?}", status.code()));
            return MuxOutcome::Degraded(format!("muxer failed: {}", detail));
        }

        info!("Muxed {:?} + {:?} -> {:?}", video, audio, output);
        MuxOutcome::Combined(output.to_path_buf())
    }
}
