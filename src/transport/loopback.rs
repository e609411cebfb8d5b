use super::room::{MediaRoom, RoomConnector, RoomEvent, SubscribedTrack};
use crate::capture::{RawAudioFrame, RawVideoFrame};
use crate::error::TransportError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct Shared {
    events: Mutex<Option<mpsc::Sender<RoomEvent>>>,
    fail_connect: AtomicBool,
    connect_delay: Mutex<Duration>,
    connects: AtomicUsize,
    disconnected: AtomicBool,
    last_url: Mutex<Option<String>>,
}

/// In-process room.
///
/// Frames published through the paired [`LoopbackHandle`] are delivered to
/// whoever connected, with no network involved.
#[derive(Clone)]
pub struct LoopbackConnector {
    shared: Arc<Shared>,
}

/// Test/demo side of a [`LoopbackConnector`]
#[derive(Clone)]
pub struct LoopbackHandle {
    shared: Arc<Shared>,
}

/// Sender for frames of a published loopback video track
#[derive(Clone)]
pub struct VideoPublisher {
    tx: mpsc::Sender<RawVideoFrame>,
}

/// Sender for frames of a published loopback audio track
#[derive(Clone)]
pub struct AudioPublisher {
    tx: mpsc::Sender<RawAudioFrame>,
}

impl LoopbackConnector {
    pub fn new() -> (Self, LoopbackHandle) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: shared.clone(),
            },
            LoopbackHandle { shared },
        )
    }
}

#[async_trait::async_trait]
impl RoomConnector for LoopbackConnector {
    async fn connect(
        &self,
        url: &str,
        _token: &str,
    ) -> Result<(Box<dyn MediaRoom>, mpsc::Receiver<RoomEvent>), TransportError> {
        let delay = self
            .shared
            .connect_delay
            .lock()
            .map(|delay| *delay)
            .unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect(format!(
                "loopback refused connection to {}",
                url
            )));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        if let Ok(mut events) = self.shared.events.lock() {
            *events = Some(tx);
        }
        if let Ok(mut last_url) = self.shared.last_url.lock() {
            *last_url = Some(url.to_string());
        }
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        self.shared.disconnected.store(false, Ordering::SeqCst);

        info!("Loopback room connected: {}", url);

        Ok((
            Box::new(LoopbackRoom {
                shared: self.shared.clone(),
                name: url.to_string(),
            }),
            rx,
        ))
    }

    fn name(&self) -> &str {
        "loopback"
    }
}

struct LoopbackRoom {
    shared: Arc<Shared>,
    name: String,
}

#[async_trait::async_trait]
impl MediaRoom for LoopbackRoom {
    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Ok(mut events) = self.shared.events.lock() {
            events.take();
        }
        self.shared.disconnected.store(true, Ordering::SeqCst);
        debug!("Loopback room {} released", self.name);
        Ok(())
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

impl LoopbackHandle {
    /// Make subsequent connects fail the handshake
    pub fn fail_connect(&self, fail: bool) {
        self.shared.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Stall every handshake for `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        if let Ok(mut current) = self.shared.connect_delay.lock() {
            *current = delay;
        }
    }

    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.sender().is_some()
    }

    /// Whether the room was released by its owner
    pub fn was_disconnected(&self) -> bool {
        self.shared.disconnected.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<String> {
        self.shared.last_url.lock().ok().and_then(|url| url.clone())
    }

    /// Publish a video track from `participant`
    pub async fn publish_video(
        &self,
        participant: &str,
        sid: &str,
    ) -> Result<VideoPublisher, TransportError> {
        let (tx, frames) = mpsc::channel(CHANNEL_CAPACITY);
        self.emit(RoomEvent::TrackSubscribed {
            participant: participant.to_string(),
            track: SubscribedTrack::Video {
                sid: sid.to_string(),
                frames,
            },
        })
        .await?;
        Ok(VideoPublisher { tx })
    }

    /// Publish an audio track from `participant`
    pub async fn publish_audio(
        &self,
        participant: &str,
        sid: &str,
    ) -> Result<AudioPublisher, TransportError> {
        let (tx, frames) = mpsc::channel(CHANNEL_CAPACITY);
        self.emit(RoomEvent::TrackSubscribed {
            participant: participant.to_string(),
            track: SubscribedTrack::Audio {
                sid: sid.to_string(),
                frames,
            },
        })
        .await?;
        Ok(AudioPublisher { tx })
    }

    pub async fn join(&self, identity: &str) -> Result<(), TransportError> {
        self.emit(RoomEvent::ParticipantConnected {
            identity: identity.to_string(),
        })
        .await
    }

    /// Simulate the server closing the room
    pub async fn drop_room(&self, reason: &str) -> Result<(), TransportError> {
        self.emit(RoomEvent::Disconnected {
            reason: reason.to_string(),
        })
        .await
    }

    fn sender(&self) -> Option<mpsc::Sender<RoomEvent>> {
        self.shared.events.lock().ok().and_then(|tx| tx.clone())
    }

    async fn emit(&self, event: RoomEvent) -> Result<(), TransportError> {
        let tx = self.sender().ok_or(TransportError::NotConnected)?;
        tx.send(event)
            .await
            .map_err(|_| TransportError::NotConnected)
    }
}

impl VideoPublisher {
    /// Returns false once the subscriber has gone away
    pub async fn send(&self, frame: RawVideoFrame) -> bool {
        self.tx.send(frame).await.is_ok()
    }
}

impl AudioPublisher {
    /// Returns false once the subscriber has gone away
    pub async fn send(&self, frame: RawAudioFrame) -> bool {
        self.tx.send(frame).await.is_ok()
    }
}
