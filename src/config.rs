use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable accepted as a fallback for `api.key`
pub const API_KEY_ENV: &str = "HEYGEN_API_KEY";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub avatar: AvatarConfig,
    pub session: KeepAliveConfig,
    pub transport: TransportConfig,
    pub capture: CaptureConfig,
    pub task: TaskConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub key: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            base_url: "https://api.heygen.com/v1".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Defaults applied to `streaming.new` when the caller does not override them
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    pub avatar_id: String,
    pub quality: String,
    pub voice_rate: f32,
    pub idle_timeout_secs: u64,
    pub video_encoding: String,
    pub version: String,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            avatar_id: "default".to_string(),
            quality: "medium".to_string(),
            voice_rate: 1.0,
            idle_timeout_secs: 120,
            video_encoding: "VP8".to_string(),
            version: "v2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    pub keep_alive_interval_secs: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_secs: u64,
    /// Open the secondary avatar event channel after the room connects
    pub event_channel: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            event_channel: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub output_dir: String,
    /// Container extension of the combined output (`mp4`, `mkv`, ...)
    pub video_format: String,
    pub target_fps: u32,
    pub jpeg_quality: u8,
    pub mux_timeout_secs: u64,
    /// Explicit muxer binary; falls back to `ffmpeg` on PATH
    pub ffmpeg_path: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: "outputs".to_string(),
            video_format: "mp4".to_string(),
            target_fps: 30,
            jpeg_quality: 85,
            mux_timeout_secs: 30,
            ffmpeg_path: None,
        }
    }
}

/// How the orchestrator decides the avatar has finished speaking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStrategy {
    /// Sleep for the vendor estimate plus the safety margin
    #[default]
    Fixed,
    /// Wait for a stop-talking / task-finished event, bounded by the fixed wait
    Event,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub safety_margin_ms: u64,
    pub default_duration_ms: u64,
    /// Ceiling on the vendor's duration estimate
    pub max_duration_ms: u64,
    pub min_output_bytes: u64,
    pub completion: CompletionStrategy,
    pub event_tail_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            safety_margin_ms: 2000,
            default_duration_ms: 5000,
            max_duration_ms: 600_000,
            min_output_bytes: 1024,
            completion: CompletionStrategy::Fixed,
            event_tail_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

impl Config {
    /// Load `path` (any format the `config` crate understands, optional) layered
    /// with `AVATAR__SECTION__KEY` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("AVATAR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let mut cfg: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        if cfg.api.key.is_empty() {
            if let Ok(key) = std::env::var(API_KEY_ENV) {
                cfg.api.key = key;
            }
        }

        Ok(cfg)
    }

    /// Check required settings and prepare the output directory
    pub fn validate(&self) -> Result<()> {
        if self.api.key.trim().is_empty() {
            bail!("API key is not configured (set api.key or {})", API_KEY_ENV);
        }
        if self.capture.target_fps == 0 {
            bail!("capture.target_fps must be greater than zero");
        }

        std::fs::create_dir_all(&self.capture.output_dir).with_context(|| {
            format!("Failed to create output directory {}", self.capture.output_dir)
        })?;

        Ok(())
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.capture.output_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.session.keep_alive_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.connect_timeout_secs)
    }
}
