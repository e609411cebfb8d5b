use super::config::SessionConfig;
use super::envelope::{AvatarListEnvelope, NewSessionEnvelope, SessionListEnvelope, TaskEnvelope};
use super::types::{AvatarDescriptor, Session, SessionDescriptor, TaskInfo, TaskKind, TaskMode};
use crate::error::SessionError;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Longest response body kept in logs and errors
const MAX_ERROR_TEXT_SIZE: usize = 2_000;

/// Client for the vendor streaming control plane.
///
/// Owns the one local [`Session`]; every mutation of it goes through the
/// methods below. Callers only ever see clones via [`SessionClient::snapshot`].
pub struct SessionClient {
    config: SessionConfig,
    http: Client,
    session: RwLock<Session>,
}

/// Optional overrides for `streaming.new`
#[derive(Debug, Clone, Default)]
pub struct CreateSessionOptions {
    pub avatar_id: Option<String>,
    pub quality: Option<String>,
    pub voice: Option<Value>,
}

impl SessionClient {
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            config,
            http,
            session: RwLock::new(Session::default()),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Control-plane base URL (the event channel host is derived from it)
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Copy of the current session state
    pub async fn snapshot(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.session.read().await.active
    }

    /// List every session visible to the credential.
    ///
    /// Used defensively before creation, so transport errors and unknown
    /// envelopes yield an empty list instead of an error.
    pub async fn list_active_sessions(&self) -> Vec<SessionDescriptor> {
        let body = match self.get_json("streaming.list").await {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to list active sessions: {}", e);
                return Vec::new();
            }
        };
        debug!("streaming.list response: {}", body);

        match serde_json::from_value::<SessionListEnvelope>(body) {
            Ok(envelope) => envelope.into_sessions(),
            Err(e) => {
                error!("Failed to decode session list: {}", e);
                Vec::new()
            }
        }
    }

    /// Best-effort sweep of all remote sessions. Returns how many were closed.
    pub async fn close_all_active_sessions(&self) -> usize {
        let sessions = self.list_active_sessions().await;
        info!("Found {} active remote sessions", sessions.len());

        let mut closed = Vec::new();
        for descriptor in sessions {
            let Some(session_id) = descriptor.session_id else {
                warn!("Session entry without session_id: {:?}", descriptor.extra);
                continue;
            };

            match self.close_session_by_id(&session_id).await {
                Ok(()) => {
                    info!("Closed remote session: {}", session_id);
                    closed.push(session_id);
                }
                Err(e) => warn!("Failed to close remote session {}: {}", session_id, e),
            }
        }

        let mut session = self.session.write().await;
        if let Some(id) = session.session_id.as_deref() {
            if closed.iter().any(|c| c == id) {
                debug!("Dropping local state for swept session {}", id);
                *session = Session::default();
            }
        }

        closed.len()
    }

    /// Create a new session after sweeping any existing ones
    pub async fn create_session(
        &self,
        options: CreateSessionOptions,
    ) -> Result<Session, SessionError> {
        self.close_all_active_sessions().await;

        let voice = options
            .voice
            .unwrap_or_else(|| json!({ "rate": self.config.voice_rate }));

        let request = json!({
            "quality": options.quality.unwrap_or_else(|| self.config.quality.clone()),
            "avatar_id": options.avatar_id.unwrap_or_else(|| self.config.avatar_id.clone()),
            "version": self.config.version,
            "video_encoding": self.config.video_encoding,
            "disable_idle_timeout": false,
            "activity_idle_timeout": self.config.idle_timeout_secs,
            "voice": voice,
        });

        info!("Creating session: {}", request);

        let body = self
            .post_json("streaming.new", &request)
            .await
            .map_err(|e| SessionError::Creation(e.to_string()))?;
        debug!("streaming.new response: {}", body);

        let data = match serde_json::from_value::<NewSessionEnvelope>(body) {
            Ok(NewSessionEnvelope::Wrapped { data }) => data,
            Ok(NewSessionEnvelope::Unrecognized(other)) => {
                return Err(SessionError::Creation(format!(
                    "unexpected response shape: {}",
                    truncate(&other.to_string())
                )));
            }
            Err(e) => return Err(SessionError::Creation(e.to_string())),
        };

        let duration_limit_secs = data.duration_limit_secs();
        let Some(session_id) = data.session_id.filter(|id| !id.is_empty()) else {
            return Err(SessionError::Creation(
                "response did not include a session_id".to_string(),
            ));
        };

        let created = Session {
            session_id: Some(session_id.clone()),
            url: data.url,
            access_token: data.access_token,
            duration_limit_secs,
            realtime_endpoint: data.realtime_endpoint,
            active: false,
        };

        *self.session.write().await = created.clone();
        info!("Session created: {}", session_id);

        Ok(created)
    }

    /// Activate the created session
    pub async fn start_session(&self) -> Result<(), SessionError> {
        let session_id = self
            .session
            .read()
            .await
            .session_id
            .clone()
            .ok_or(SessionError::NotCreated)?;

        self.post_json("streaming.start", &json!({ "session_id": session_id }))
            .await
            .map_err(|e| SessionError::Activation(e.to_string()))?;

        self.session.write().await.active = true;
        info!("Session started: {}", session_id);

        Ok(())
    }

    /// Ask the avatar to speak `text`
    pub async fn dispatch_task(
        &self,
        text: &str,
        kind: TaskKind,
        mode: TaskMode,
    ) -> Result<TaskInfo, SessionError> {
        let session_id = self
            .session
            .read()
            .await
            .session_id
            .clone()
            .ok_or(SessionError::NotActive)?;

        let preview: String = text.chars().take(50).collect();
        info!("Dispatching {} task: {}...", kind.as_str(), preview);

        let request = json!({
            "session_id": session_id,
            "text": text,
            "task_type": kind.as_str(),
            "task_mode": mode.as_str(),
        });

        let body = self
            .post_json("streaming.task", &request)
            .await
            .map_err(|e| SessionError::Dispatch(e.to_string()))?;

        let info = match serde_json::from_value::<TaskEnvelope>(body.clone()) {
            Ok(envelope) => envelope.into_task_info(body),
            Err(e) => return Err(SessionError::Dispatch(e.to_string())),
        };

        info!(
            "Task dispatched: task_id={:?}, estimated {:?}ms",
            info.task_id, info.duration_ms
        );

        Ok(info)
    }

    /// Interrupt whatever the avatar is saying. Never fails.
    pub async fn interrupt(&self) -> bool {
        let Some(session_id) = self.session.read().await.session_id.clone() else {
            warn!("Cannot interrupt: no session");
            return false;
        };

        match self
            .post_json("streaming.interrupt", &json!({ "session_id": session_id }))
            .await
        {
            Ok(_) => {
                info!("Task interrupted");
                true
            }
            Err(e) => {
                error!("Interrupt failed: {}", e);
                false
            }
        }
    }

    /// Reset the remote idle timer
    pub async fn keep_alive(&self) -> bool {
        let Some(session_id) = self.session.read().await.session_id.clone() else {
            return false;
        };

        match self
            .post_json("streaming.keep_alive", &json!({ "session_id": session_id }))
            .await
        {
            Ok(_) => {
                debug!("Keep-alive sent for {}", session_id);
                true
            }
            Err(e) => {
                error!("Keep-alive failed: {}", e);
                false
            }
        }
    }

    /// Close the local session. Succeeds trivially if there is none.
    pub async fn close_session(&self) -> Result<(), SessionError> {
        let Some(session_id) = self.session.read().await.session_id.clone() else {
            return Ok(());
        };

        self.close_session_by_id(&session_id).await?;

        let mut session = self.session.write().await;
        if session.session_id.as_deref() == Some(session_id.as_str()) {
            *session = Session::default();
        }
        info!("Session closed: {}", session_id);

        Ok(())
    }

    /// Avatars available to the credential (empty on failure)
    pub async fn list_avatars(&self) -> Vec<AvatarDescriptor> {
        match self.get_json("streaming/avatar.list").await {
            Ok(body) => match serde_json::from_value::<AvatarListEnvelope>(body) {
                Ok(envelope) => envelope.into_avatars(),
                Err(e) => {
                    error!("Failed to decode avatar list: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                error!("Failed to list avatars: {}", e);
                Vec::new()
            }
        }
    }

    /// Close the session if it was started
    pub async fn cleanup(&self) {
        if self.is_active().await {
            if let Err(e) = self.close_session().await {
                error!("Failed to close session during cleanup: {}", e);
            }
        }
    }

    async fn close_session_by_id(&self, session_id: &str) -> Result<(), SessionError> {
        self.post_json("streaming.stop", &json!({ "session_id": session_id }))
            .await
            .map(|_| ())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json(&self, path: &str) -> Result<Value, SessionError> {
        let response = self
            .http
            .get(self.endpoint(path))
            .header("accept", "application/json")
            .header("x-api-key", &self.config.api_key)
            .send()
            .await?;

        Self::read_json(path, response).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, SessionError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .header("accept", "application/json")
            .header("x-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await?;

        Self::read_json(path, response).await
    }

    async fn read_json(path: &str, response: reqwest::Response) -> Result<Value, SessionError> {
        let status = response.status();
        let text = response.text().await?;

        if status != StatusCode::OK {
            let body = truncate(&text);
            error!("{} returned {}: {}", path, status, body);
            return Err(SessionError::RemoteApi {
                status: status.as_u16(),
                body,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            error!("{} returned malformed JSON: {}", path, truncate(&text));
            SessionError::Decode(e)
        })
    }
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_ERROR_TEXT_SIZE {
        return text.to_string();
    }
    let mut end = MAX_ERROR_TEXT_SIZE;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
