//! Media Transport Connector
//!
//! Room connections are made through a [`RoomConnector`] so the capture
//! pipeline does not care whether frames come from LiveKit or the in-process
//! loopback room.

mod connector;
mod events;
#[cfg(feature = "livekit")]
mod livekit_room;
mod loopback;
mod room;

pub use connector::{ConnectParams, MediaConnector};
pub use events::{event_channel_url, AvatarEvent, EventChannel};
#[cfg(feature = "livekit")]
pub use livekit_room::LiveKitConnector;
pub use loopback::{AudioPublisher, LoopbackConnector, LoopbackHandle, VideoPublisher};
pub use room::{MediaRoom, RoomConnector, RoomEvent, SubscribedTrack};

use crate::error::TransportError;
use std::sync::Arc;

/// Connector for real avatar rooms.
///
/// The loopback room never carries vendor media, so builds without the
/// `livekit` feature have nothing to offer here.
#[cfg(feature = "livekit")]
pub fn live_connector() -> Result<Arc<dyn RoomConnector>, TransportError> {
    Ok(Arc::new(LiveKitConnector::new()))
}

#[cfg(not(feature = "livekit"))]
pub fn live_connector() -> Result<Arc<dyn RoomConnector>, TransportError> {
    Err(TransportError::Unavailable(
        "rebuild with `--features livekit` to record real sessions".to_string(),
    ))
}
