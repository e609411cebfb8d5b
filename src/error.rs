//! Error taxonomy for the avatar recording pipeline

use std::time::Duration;
use thiserror::Error;

/// Remote control-plane failures
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No session has been created")]
    NotCreated,

    #[error("No active session")]
    NotActive,

    #[error("Session creation failed: {0}")]
    Creation(String),

    #[error("Session activation failed: {0}")]
    Activation(String),

    #[error("Task dispatch failed: {0}")]
    Dispatch(String),

    #[error("Remote API returned {status}: {body}")]
    RemoteApi { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Media room failures
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Room connection failed: {0}")]
    Connect(String),

    #[error("Room connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Event channel error: {0}")]
    EventChannel(String),

    #[error("No media room transport in this build: {0}")]
    Unavailable(String),
}

/// Container write failures
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No video frames were captured")]
    NoVideoCaptured,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Export worker failed: {0}")]
    Worker(String),
}

/// Recording window failures
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("A recording window is already open for task {0}")]
    WindowAlreadyOpen(String),

    #[error("No recording window is open")]
    NotRecording,

    #[error("No media was captured")]
    NoMediaCaptured,

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Errors surfaced by the task orchestrator
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("A task is already being processed")]
    AlreadyProcessing,

    #[error("Task was interrupted")]
    Interrupted,

    #[error("Output rejected: {0}")]
    OutputRejected(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}
