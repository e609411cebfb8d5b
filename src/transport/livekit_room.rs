//! LiveKit room transport (feature `livekit`)

use super::room::{MediaRoom, RoomConnector, RoomEvent, SubscribedTrack};
use crate::capture::{PixelFormat, RawAudioFrame, RawVideoFrame, SampleData};
use crate::error::TransportError;
use futures::StreamExt;
use livekit::prelude::{RemoteTrack, Room, RoomOptions};
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use livekit::webrtc::video_stream::native::NativeVideoStream;
use tokio::sync::mpsc;
use tracing::{debug, info};

const CHANNEL_CAPACITY: usize = 256;
const AUDIO_SAMPLE_RATE: i32 = 48_000;
const AUDIO_CHANNELS: i32 = 1;

/// Connects to LiveKit rooms handed out by the vendor
#[derive(Debug, Clone, Default)]
pub struct LiveKitConnector;

impl LiveKitConnector {
    pub fn new() -> Self {
        Self
    }
}

struct LiveKitRoom {
    room: Room,
}

#[async_trait::async_trait]
impl MediaRoom for LiveKitRoom {
    async fn disconnect(&self) -> Result<(), TransportError> {
        self.room
            .close()
            .await
            .map_err(|e| TransportError::Connect(format!("room close failed: {}", e)))
    }

    fn name(&self) -> String {
        self.room.name()
    }
}

#[async_trait::async_trait]
impl RoomConnector for LiveKitConnector {
    async fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> Result<(Box<dyn MediaRoom>, mpsc::Receiver<RoomEvent>), TransportError> {
        let (room, mut lk_events) = Room::connect(url, token, RoomOptions::default())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(event) = lk_events.recv().await {
                let mapped = match event {
                    livekit::RoomEvent::TrackSubscribed {
                        track, participant, ..
                    } => match track {
                        RemoteTrack::Video(video) => {
                            let sid = video.sid().to_string();
                            let frames = spawn_video_pump(NativeVideoStream::new(video.rtc_track()));
                            Some(RoomEvent::TrackSubscribed {
                                participant: participant.identity().to_string(),
                                track: SubscribedTrack::Video { sid, frames },
                            })
                        }
                        RemoteTrack::Audio(audio) => {
                            let sid = audio.sid().to_string();
                            let frames = spawn_audio_pump(NativeAudioStream::new(
                                audio.rtc_track(),
                                AUDIO_SAMPLE_RATE,
                                AUDIO_CHANNELS,
                            ));
                            Some(RoomEvent::TrackSubscribed {
                                participant: participant.identity().to_string(),
                                track: SubscribedTrack::Audio { sid, frames },
                            })
                        }
                    },
                    livekit::RoomEvent::ParticipantConnected(participant) => {
                        Some(RoomEvent::ParticipantConnected {
                            identity: participant.identity().to_string(),
                        })
                    }
                    livekit::RoomEvent::Disconnected { reason } => Some(RoomEvent::Disconnected {
                        reason: format!("{:?}", reason),
                    }),
                    _ => None,
                };

                if let Some(event) = mapped {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            }
            debug!("LiveKit event pump finished");
        });

        info!("Joined LiveKit room {}", room.name());
        Ok((Box::new(LiveKitRoom { room }), rx))
    }

    fn name(&self) -> &str {
        "livekit"
    }
}

fn spawn_video_pump(mut stream: NativeVideoStream) -> mpsc::Receiver<RawVideoFrame> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let i420 = frame.buffer.to_i420();
            let (stride_y, stride_u, stride_v) = i420.strides();
            let (y, u, v) = i420.data();

            let mut data = Vec::with_capacity(y.len() + u.len() + v.len());
            data.extend_from_slice(y);
            data.extend_from_slice(u);
            data.extend_from_slice(v);

            let raw = RawVideoFrame {
                width: i420.width(),
                height: i420.height(),
                format: PixelFormat::I420 {
                    stride_y,
                    stride_u,
                    stride_v,
                },
                data,
            };
            if tx.send(raw).await.is_err() {
                break;
            }
        }
    });
    rx
}

fn spawn_audio_pump(mut stream: NativeAudioStream) -> mpsc::Receiver<RawAudioFrame> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let raw = RawAudioFrame {
                sample_rate: frame.sample_rate,
                channels: frame.num_channels as u16,
                samples: SampleData::I16(frame.data.to_vec()),
            };
            if tx.send(raw).await.is_err() {
                break;
            }
        }
    });
    rx
}
