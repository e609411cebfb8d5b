//! Mux & Export
//!
//! Turns a closed recording window into a playable file:
//! - MJPEG/AVI video intermediate at a fixed frame rate
//! - 16-bit PCM WAV audio intermediate
//! - `ffmpeg` mux into the final container, falling back to video-only

pub mod avi;
pub mod exporter;
pub mod mux;
pub mod wav;

pub use avi::{probe_video, write_video, AviWriter, VideoInfo};
pub use exporter::{ExportResult, ExportSettings, Exporter};
pub use mux::{MuxOutcome, Muxer};
pub use wav::{write_audio, AudioMetadata, WavFileWriter};
