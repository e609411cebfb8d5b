use super::events::{event_channel_url, AvatarEvent, EventChannel};
use super::room::{MediaRoom, RoomConnector, RoomEvent, SubscribedTrack};
use crate::capture::{FrameRecorder, RecordingStats};
use crate::error::{CaptureError, TransportError};
use crate::export::ExportResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_BUFFER: usize = 64;

/// Where and how to join the media room
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub url: String,
    pub token: String,
    /// Needed, with `control_url`, to open the event channel
    pub session_id: Option<String>,
    pub control_url: Option<String>,
}

struct Connection {
    room: Box<dyn MediaRoom>,
    dispatcher: JoinHandle<()>,
    workers: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>>,
    events: Option<EventChannel>,
}

/// Media Transport Connector.
///
/// Holds at most one room connection. Track workers run for the whole life
/// of the connection and push every frame into the [`FrameRecorder`], which
/// keeps only those that arrive while a window is open.
pub struct MediaConnector {
    connector: Arc<dyn RoomConnector>,
    recorder: Arc<FrameRecorder>,
    connect_timeout: Duration,
    event_channel: bool,
    connection: Mutex<Option<Connection>>,
    connected: Arc<AtomicBool>,
    events_tx: broadcast::Sender<AvatarEvent>,
}

impl MediaConnector {
    pub fn new(
        connector: Arc<dyn RoomConnector>,
        recorder: Arc<FrameRecorder>,
        connect_timeout: Duration,
        event_channel: bool,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            connector,
            recorder,
            connect_timeout,
            event_channel,
            connection: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            events_tx,
        }
    }

    pub fn recorder(&self) -> &Arc<FrameRecorder> {
        &self.recorder
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Events from the secondary channel, if one is open
    pub fn subscribe_events(&self) -> broadcast::Receiver<AvatarEvent> {
        self.events_tx.subscribe()
    }

    /// Join the room and start consuming its tracks.
    ///
    /// A no-op when already connected. The event channel is best-effort.
    pub async fn connect(&self, params: &ConnectParams) -> Result<(), TransportError> {
        let mut connection = self.connection.lock().await;
        if connection.is_some() && self.is_connected() {
            debug!("Already connected, reusing room");
            return Ok(());
        }
        if let Some(stale) = connection.take() {
            debug!("Releasing stale room before reconnecting");
            Self::release(stale).await;
        }

        info!(
            "Connecting to room via {}: {}",
            self.connector.name(),
            params.url
        );

        let (room, room_events) = tokio::time::timeout(
            self.connect_timeout,
            self.connector.connect(&params.url, &params.token),
        )
        .await
        .map_err(|_| TransportError::ConnectTimeout(self.connect_timeout))??;

        self.connected.store(true, Ordering::SeqCst);

        let workers = Arc::new(std::sync::Mutex::new(Vec::new()));
        let dispatcher = tokio::spawn(dispatch_room_events(
            room_events,
            self.recorder.clone(),
            workers.clone(),
            self.connected.clone(),
        ));

        let events = match (&params.session_id, &params.control_url) {
            (Some(session_id), Some(control_url)) if self.event_channel => {
                self.open_event_channel(control_url, session_id, &params.token)
                    .await
            }
            _ => None,
        };

        info!("Connected to room {}", room.name());
        *connection = Some(Connection {
            room,
            dispatcher,
            workers,
            events,
        });

        Ok(())
    }

    async fn open_event_channel(
        &self,
        control_url: &str,
        session_id: &str,
        token: &str,
    ) -> Option<EventChannel> {
        let url = match event_channel_url(control_url, session_id, token) {
            Ok(url) => url,
            Err(e) => {
                warn!("Skipping event channel: {}", e);
                return None;
            }
        };

        match EventChannel::open(&url, self.events_tx.clone()).await {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!("Event channel unavailable: {}", e);
                None
            }
        }
    }

    /// Open a recording window on the shared recorder
    pub async fn start_recording(&self, task_id: &str) -> Result<String, CaptureError> {
        self.recorder.start_recording(task_id).await
    }

    /// Close the recording window and export it
    pub async fn stop_recording(&self) -> Result<Option<ExportResult>, CaptureError> {
        self.recorder.stop_recording().await
    }

    pub async fn recording_stats(&self) -> RecordingStats {
        self.recorder.stats().await
    }

    /// Leave the room.
    ///
    /// An open recording window is closed and exported first; its result is
    /// returned so the capture is not lost silently.
    pub async fn disconnect(&self) -> Option<ExportResult> {
        let exported = if self.recorder.is_recording() {
            info!("Closing open recording window before disconnect");
            match self.recorder.stop_recording().await {
                Ok(result) => result,
                Err(e) => {
                    error!("Export during disconnect failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        if let Some(connection) = self.connection.lock().await.take() {
            Self::release(connection).await;
            info!("Disconnected from room");
        }
        self.connected.store(false, Ordering::SeqCst);

        exported
    }

    async fn release(connection: Connection) {
        connection.dispatcher.abort();
        if let Ok(mut workers) = connection.workers.lock() {
            for worker in workers.drain(..) {
                worker.abort();
            }
        }
        if let Some(events) = connection.events {
            events.close();
        }
        if let Err(e) = connection.room.disconnect().await {
            warn!("Room disconnect failed: {}", e);
        }
    }
}

async fn dispatch_room_events(
    mut room_events: mpsc::Receiver<RoomEvent>,
    recorder: Arc<FrameRecorder>,
    workers: Arc<std::sync::Mutex<Vec<JoinHandle<()>>>>,
    connected: Arc<AtomicBool>,
) {
    while let Some(event) = room_events.recv().await {
        match event {
            RoomEvent::TrackSubscribed { participant, track } => {
                info!(
                    "Track subscribed: {} {} from {}",
                    track.kind(),
                    track.sid(),
                    participant
                );
                let handle = tokio::spawn(consume_track(track, recorder.clone()));
                if let Ok(mut workers) = workers.lock() {
                    workers.retain(|w| !w.is_finished());
                    workers.push(handle);
                }
            }
            RoomEvent::ParticipantConnected { identity } => {
                info!("Participant connected: {}", identity);
            }
            RoomEvent::Disconnected { reason } => {
                warn!("Disconnected from room: {}", reason);
                connected.store(false, Ordering::SeqCst);
            }
        }
    }
    debug!("Room event stream ended");
    connected.store(false, Ordering::SeqCst);
}

async fn consume_track(track: SubscribedTrack, recorder: Arc<FrameRecorder>) {
    match track {
        SubscribedTrack::Video { sid, mut frames } => {
            while let Some(frame) = frames.recv().await {
                recorder.on_video_frame(frame).await;
            }
            debug!("Video track {} ended", sid);
        }
        SubscribedTrack::Audio { sid, mut frames } => {
            while let Some(frame) = frames.recv().await {
                recorder.on_audio_frame(frame).await;
            }
            debug!("Audio track {} ended", sid);
        }
    }
}
