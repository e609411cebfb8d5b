use crate::error::TransportError;
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

const EVENT_CHANNEL_PATH: &str = "/v1/ws/streaming.chat";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Avatar activity reported on the event channel
#[derive(Debug, Clone, PartialEq)]
pub enum AvatarEvent {
    StartTalking,
    StopTalking,
    TaskFinished { task_id: Option<String> },
    Other(String),
}

impl AvatarEvent {
    /// Parse one text message. `None` if it is not a JSON object with a `type`.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let kind = value.get("type")?.as_str()?;

        Some(match kind {
            "avatar_start_talking" => AvatarEvent::StartTalking,
            "avatar_stop_talking" => AvatarEvent::StopTalking,
            "task_finished" => AvatarEvent::TaskFinished {
                task_id: value
                    .get("task_id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            other => AvatarEvent::Other(other.to_string()),
        })
    }

    /// Whether this event means the avatar is done speaking
    pub fn ends_speech(&self) -> bool {
        matches!(
            self,
            AvatarEvent::StopTalking | AvatarEvent::TaskFinished { .. }
        )
    }
}

/// Build the event channel URL on the control-plane host.
///
/// `https` bases map to `wss`, plain `http` (local fakes) to `ws`.
pub fn event_channel_url(
    control_url: &str,
    session_id: &str,
    session_token: &str,
) -> Result<Url, TransportError> {
    let base = Url::parse(control_url)
        .map_err(|e| TransportError::EventChannel(format!("invalid control URL: {}", e)))?;
    let host = base
        .host_str()
        .ok_or_else(|| TransportError::EventChannel("control URL has no host".to_string()))?;

    let scheme = if base.scheme() == "http" { "ws" } else { "wss" };
    let authority = match base.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let mut url = Url::parse(&format!("{}://{}{}", scheme, authority, EVENT_CHANNEL_PATH))
        .map_err(|e| TransportError::EventChannel(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("session_id", session_id)
        .append_pair("session_token", session_token)
        .append_pair("silence_response", "false");

    Ok(url)
}

/// Open WebSocket to the vendor event feed
pub struct EventChannel {
    reader: JoinHandle<()>,
}

impl EventChannel {
    /// Connect and start forwarding parsed events to `events`
    pub async fn open(
        url: &Url,
        events: broadcast::Sender<AvatarEvent>,
    ) -> Result<Self, TransportError> {
        info!("Connecting event channel: {}{}", url.origin().ascii_serialization(), url.path());

        let (ws_stream, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| TransportError::EventChannel("connection timed out".to_string()))?
            .map_err(|e| TransportError::EventChannel(format!("failed to connect: {}", e)))?;

        let (_write, mut read) = ws_stream.split();

        let reader = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match AvatarEvent::parse(&text) {
                        Some(event) => {
                            info!("Avatar event: {:?}", event);
                            // No subscribers is fine
                            let _ = events.send(event);
                        }
                        None => warn!("Unparseable event message: {}", text),
                    },
                    Ok(Message::Close(frame)) => {
                        debug!("Event channel closed by server: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Event channel error: {}", e);
                        break;
                    }
                }
            }
            debug!("Event channel reader finished");
        });

        info!("Event channel connected");
        Ok(Self { reader })
    }

    pub fn is_open(&self) -> bool {
        !self.reader.is_finished()
    }

    pub fn close(self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_event_types() {
        assert_eq!(
            AvatarEvent::parse(r#"{"type":"avatar_start_talking"}"#),
            Some(AvatarEvent::StartTalking)
        );
        assert_eq!(
            AvatarEvent::parse(r#"{"type":"task_finished","task_id":"t1"}"#),
            Some(AvatarEvent::TaskFinished {
                task_id: Some("t1".to_string())
            })
        );
        assert_eq!(
            AvatarEvent::parse(r#"{"type":"user_talking"}"#),
            Some(AvatarEvent::Other("user_talking".to_string()))
        );
        assert_eq!(AvatarEvent::parse("not json"), None);
        assert_eq!(AvatarEvent::parse(r#"{"kind":"x"}"#), None);
    }

    #[test]
    fn url_is_built_on_control_host() {
        let url = event_channel_url("https://api.heygen.com/v1", "s 1", "tok").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.host_str(), Some("api.heygen.com"));
        assert_eq!(url.path(), "/v1/ws/streaming.chat");
        assert_eq!(
            url.query(),
            Some("session_id=s+1&session_token=tok&silence_response=false")
        );

        let local = event_channel_url("http://127.0.0.1:4010/v1", "s", "t").unwrap();
        assert_eq!(local.scheme(), "ws");
        assert_eq!(local.port(), Some(4010));
    }
}
