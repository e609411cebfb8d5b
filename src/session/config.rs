use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the remote session client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Vendor API key, sent as `x-api-key`
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Control-plane base URL (e.g. "https://api.heygen.com/v1")
    pub base_url: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Avatar rendered when the caller does not pick one
    pub avatar_id: String,

    /// Rendering quality ("low", "medium", "high")
    pub quality: String,

    /// Voice speed multiplier used when no voice settings are supplied
    pub voice_rate: f32,

    /// Remote idle timeout in seconds; keep-alive must tick faster than this
    pub idle_timeout_secs: u64,

    /// Video codec requested from the renderer
    pub video_encoding: String,

    /// Streaming API version
    pub version: String,
}

impl SessionConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            api_key: cfg.api.key.clone(),
            base_url: cfg.api.base_url.clone(),
            request_timeout: cfg.request_timeout(),
            avatar_id: cfg.avatar.avatar_id.clone(),
            quality: cfg.avatar.quality.clone(),
            voice_rate: cfg.avatar.voice_rate,
            idle_timeout_secs: cfg.avatar.idle_timeout_secs,
            video_encoding: cfg.avatar.video_encoding.clone(),
            version: cfg.avatar.version.clone(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
