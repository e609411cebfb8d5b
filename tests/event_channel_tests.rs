// Integration tests for the avatar event channel
//
// A local WebSocket server stands in for the vendor event feed.

mod support;

use anyhow::Result;
use avatar_recorder::export::Muxer;
use avatar_recorder::transport::AvatarEvent;
use avatar_recorder::{ConnectParams, FrameRecorder, LoopbackConnector, MediaConnector};
use futures::SinkExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// Accept one client, report its request URI, then send `messages`
async fn event_server(messages: Vec<&'static str>) -> Result<(u16, oneshot::Receiver<String>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let (uri_tx, uri_rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let callback = |request: &Request, response: Response| {
            let _ = uri_tx.send(request.uri().to_string());
            Ok::<_, ErrorResponse>(response)
        };
        let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
            return;
        };
        for message in messages {
            if ws.send(Message::Text(message.to_string())).await.is_err() {
                return;
            }
        }
        // Hold the socket open until the client goes away
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    Ok((port, uri_rx))
}

fn connector(dir: &TempDir, event_channel: bool) -> MediaConnector {
    let (loopback, _room) = LoopbackConnector::new();
    MediaConnector::new(
        Arc::new(loopback),
        Arc::new(FrameRecorder::new(support::exporter(
            dir.path(),
            Muxer::unavailable(),
        ))),
        Duration::from_secs(1),
        event_channel,
    )
}

fn params(port: u16) -> ConnectParams {
    ConnectParams {
        url: "loopback://room".to_string(),
        token: "room-token".to_string(),
        session_id: Some("sess-42".to_string()),
        control_url: Some(format!("http://127.0.0.1:{}/v1", port)),
    }
}

#[tokio::test]
async fn test_events_are_broadcast_to_subscribers() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (port, uri) = event_server(vec![
        r#"{"type":"avatar_start_talking"}"#,
        "this is not json",
        r#"{"type":"task_finished","task_id":"vendor-task-7"}"#,
    ])
    .await?;

    let connector = connector(&temp_dir, true);
    let mut events = connector.subscribe_events();
    connector.connect(&params(port)).await?;

    let uri = tokio::time::timeout(Duration::from_secs(2), uri).await??;
    assert!(uri.starts_with("/v1/ws/streaming.chat?"), "got {}", uri);
    assert!(uri.contains("session_id=sess-42"));
    assert!(uri.contains("session_token=room-token"));
    assert!(uri.contains("silence_response=false"));

    let first = tokio::time::timeout(Duration::from_secs(2), events.recv()).await??;
    assert_eq!(first, AvatarEvent::StartTalking);

    // The malformed message is skipped
    let second = tokio::time::timeout(Duration::from_secs(2), events.recv()).await??;
    assert_eq!(
        second,
        AvatarEvent::TaskFinished {
            task_id: Some("vendor-task-7".to_string())
        }
    );
    assert!(second.ends_speech());

    connector.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn test_missing_event_feed_does_not_block_connect() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // Bind and drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0").await?.local_addr()?.port();

    let connector = connector(&temp_dir, true);
    connector.connect(&params(port)).await?;

    assert!(connector.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_event_channel_disabled() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (port, uri) = event_server(vec![r#"{"type":"avatar_start_talking"}"#]).await?;

    let connector = connector(&temp_dir, false);
    let mut events = connector.subscribe_events();
    connector.connect(&params(port)).await?;

    assert!(tokio::time::timeout(Duration::from_millis(300), uri)
        .await
        .is_err());
    assert!(events.try_recv().is_err());
    Ok(())
}
