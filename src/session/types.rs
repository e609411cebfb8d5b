use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Local view of the single remote rendering session
#[derive(Debug, Clone, Default, Serialize)]
pub struct Session {
    pub session_id: Option<String>,

    /// Media room URL
    pub url: Option<String>,

    /// Media room credential
    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    /// Maximum session length in seconds, if the vendor reports one
    pub duration_limit_secs: Option<u64>,

    pub realtime_endpoint: Option<String>,

    /// Set once `streaming.start` succeeds
    pub active: bool,
}

impl Session {
    pub fn is_created(&self) -> bool {
        self.session_id.is_some()
    }
}

/// One entry of `streaming.list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescriptor {
    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of `streaming/avatar.list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarDescriptor {
    #[serde(default)]
    pub avatar_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How the avatar treats dispatched text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Speak the literal text
    #[default]
    Repeat,
    /// Treat the text as conversational input
    Chat,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Repeat => "repeat",
            TaskKind::Chat => "chat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    #[default]
    Sync,
    Async,
}

impl TaskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::Sync => "sync",
            TaskMode::Async => "async",
        }
    }
}

/// Vendor metadata returned by `streaming.task`
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub task_id: Option<String>,

    /// Vendor estimate of how long the avatar will speak
    pub duration_ms: Option<u64>,

    /// Full response body
    pub raw: Value,
}
