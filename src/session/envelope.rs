//! Response envelope decoders for the streaming control API
//!
//! The vendor wraps payloads differently per endpoint (and sometimes per
//! deployment), so each endpoint gets a small untagged decoder with an explicit
//! fallback variant instead of poking at raw JSON.

use super::types::{AvatarDescriptor, SessionDescriptor, TaskInfo};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// `streaming.list`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SessionListEnvelope {
    /// `[...]`
    Bare(Vec<Value>),
    /// `{"data": ...}`
    Wrapped { data: SessionListData },
    Unrecognized(Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SessionListData {
    /// `{"data": {"sessions": [...]}}`
    Sessions { sessions: Vec<Value> },
    /// `{"data": [...]}`
    List(Vec<Value>),
    Unrecognized(Value),
}

impl SessionListEnvelope {
    /// Flatten into descriptors; unknown shapes and non-object entries are logged and dropped.
    pub fn into_sessions(self) -> Vec<SessionDescriptor> {
        let entries = match self {
            SessionListEnvelope::Bare(list) => list,
            SessionListEnvelope::Wrapped { data } => match data {
                SessionListData::Sessions { sessions } => sessions,
                SessionListData::List(list) => list,
                SessionListData::Unrecognized(other) => {
                    warn!("Unrecognized session list payload: {}", other);
                    Vec::new()
                }
            },
            SessionListEnvelope::Unrecognized(other) => {
                warn!("Unrecognized session list envelope: {}", other);
                Vec::new()
            }
        };

        entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<SessionDescriptor>(entry.clone()) {
                Ok(descriptor) => Some(descriptor),
                Err(_) => {
                    warn!("Skipping unexpected session entry: {}", entry);
                    None
                }
            })
            .collect()
    }
}

/// `streaming.new`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NewSessionEnvelope {
    Wrapped { data: NewSessionData },
    Unrecognized(Value),
}

#[derive(Debug, Default, Deserialize)]
pub struct NewSessionData {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Number or numeric string depending on API version
    #[serde(default)]
    pub session_duration_limit: Option<Value>,
    #[serde(default)]
    pub realtime_endpoint: Option<String>,
}

impl NewSessionData {
    pub fn duration_limit_secs(&self) -> Option<u64> {
        match self.session_duration_limit.as_ref()? {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// `streaming.task`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TaskEnvelope {
    Wrapped { data: TaskData },
    Unrecognized(Value),
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskData {
    /// String or number, depending on the API revision
    #[serde(default)]
    pub task_id: Option<Value>,
    #[serde(default)]
    pub duration_ms: Option<f64>,
}

impl TaskEnvelope {
    pub fn into_task_info(self, raw: Value) -> TaskInfo {
        match self {
            TaskEnvelope::Wrapped { data } => TaskInfo {
                task_id: data.task_id.and_then(|id| match id {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
                duration_ms: data.duration_ms.filter(|d| *d >= 0.0).map(|d| d as u64),
                raw,
            },
            TaskEnvelope::Unrecognized(_) => {
                warn!("Task response has no data payload: {}", raw);
                TaskInfo {
                    task_id: None,
                    duration_ms: None,
                    raw,
                }
            }
        }
    }
}

/// `streaming/avatar.list`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AvatarListEnvelope {
    Wrapped { data: Vec<AvatarDescriptor> },
    Unrecognized(Value),
}

impl AvatarListEnvelope {
    pub fn into_avatars(self) -> Vec<AvatarDescriptor> {
        match self {
            AvatarListEnvelope::Wrapped { data } => data,
            AvatarListEnvelope::Unrecognized(other) => {
                warn!("Unrecognized avatar list envelope: {}", other);
                Vec::new()
            }
        }
    }
}
