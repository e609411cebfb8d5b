use crate::capture::{RawAudioFrame, RawVideoFrame};
use crate::error::TransportError;
use tokio::sync::mpsc;

/// Media track handed over once the room subscribes to it.
///
/// Each track carries its own frame receiver; the receiver ends when the
/// track is unpublished or the room goes away.
#[derive(Debug)]
pub enum SubscribedTrack {
    Video {
        sid: String,
        frames: mpsc::Receiver<RawVideoFrame>,
    },
    Audio {
        sid: String,
        frames: mpsc::Receiver<RawAudioFrame>,
    },
}

impl SubscribedTrack {
    pub fn sid(&self) -> &str {
        match self {
            SubscribedTrack::Video { sid, .. } | SubscribedTrack::Audio { sid, .. } => sid,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SubscribedTrack::Video { .. } => "video",
            SubscribedTrack::Audio { .. } => "audio",
        }
    }
}

/// Room-level events
#[derive(Debug)]
pub enum RoomEvent {
    TrackSubscribed {
        participant: String,
        track: SubscribedTrack,
    },
    ParticipantConnected {
        identity: String,
    },
    Disconnected {
        reason: String,
    },
}

/// A connected media room
#[async_trait::async_trait]
pub trait MediaRoom: Send + Sync {
    /// Leave the room and release the connection
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Room name for logging
    fn name(&self) -> String;
}

/// Media transport implementation.
///
/// - LiveKit: real WebRTC rooms (feature `livekit`)
/// - Loopback: in-process room fed by a [`LoopbackHandle`](super::LoopbackHandle)
#[async_trait::async_trait]
pub trait RoomConnector: Send + Sync {
    /// Join the room at `url` with `token`.
    ///
    /// Returns the room handle and a receiver of room events.
    async fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> Result<(Box<dyn MediaRoom>, mpsc::Receiver<RoomEvent>), TransportError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
