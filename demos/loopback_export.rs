// Offline export demo: synthetic frames through the loopback room
//
// This example runs the capture half of the pipeline without a vendor
// account:
// 1. A loopback room stands in for the media transport
// 2. A moving test pattern and a 440Hz tone are published as tracks
// 3. A recording window is opened for two seconds
// 4. The window is exported (muxed with ffmpeg when it is on PATH)
//
// Usage: cargo run --example loopback_export -- [output_dir]

use anyhow::Result;
use avatar_recorder::capture::{PixelFormat, SampleData};
use avatar_recorder::export::{ExportSettings, Exporter};
use avatar_recorder::{
    probe_video, ConnectParams, FrameRecorder, LoopbackConnector, MediaConnector, Muxer,
    RawAudioFrame, RawVideoFrame,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

fn test_pattern(index: u32) -> RawVideoFrame {
    let mut data = Vec::with_capacity((WIDTH * HEIGHT * 3) as usize);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            data.push(((x + index * 4) % 256) as u8);
            data.push(((y + index * 2) % 256) as u8);
            data.push(128);
        }
    }
    RawVideoFrame {
        width: WIDTH,
        height: HEIGHT,
        format: PixelFormat::Rgb24,
        data,
    }
}

fn tone(index: u32) -> RawAudioFrame {
    // 20ms at 48kHz
    let samples = (0..960)
        .map(|i| {
            let t = (index * 960 + i) as f32 / 48_000.0;
            (t * 440.0 * std::f32::consts::TAU).sin() * 0.3
        })
        .collect();
    RawAudioFrame {
        sample_rate: 48_000,
        channels: 1,
        samples: SampleData::F32(samples),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("outputs"));

    // 1. Wire the recorder to a loopback room
    let muxer = Muxer::locate(None, Duration::from_secs(30));
    let exporter = Exporter::new(
        ExportSettings {
            output_dir,
            video_format: "mp4".to_string(),
            target_fps: 30,
            jpeg_quality: 85,
        },
        muxer,
    );
    let (loopback, room) = LoopbackConnector::new();
    let connector = MediaConnector::new(
        Arc::new(loopback),
        Arc::new(FrameRecorder::new(exporter)),
        Duration::from_secs(5),
        false,
    );
    connector
        .connect(&ConnectParams {
            url: "loopback://demo".to_string(),
            token: String::new(),
            session_id: None,
            control_url: None,
        })
        .await?;

    // 2. Publish tracks
    let video = room.publish_video("demo-avatar", "TR_video").await?;
    let audio = room.publish_audio("demo-avatar", "TR_audio").await?;

    // 3. Record two seconds
    connector.start_recording("loopback-demo").await?;
    let mut ticker = tokio::time::interval(Duration::from_millis(20));
    for i in 0..100 {
        ticker.tick().await;
        // Video at 25fps, audio every tick
        if i % 2 == 0 {
            video.send(test_pattern(i)).await;
        }
        audio.send(tone(i)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // 4. Export
    let Some(result) = connector.stop_recording().await? else {
        info!("Nothing captured");
        return Ok(());
    };
    info!(
        "Exported {:?} ({} video / {} audio frames, audio: {})",
        result.path, result.video_frames, result.audio_frames, result.has_audio
    );
    if let Some(reason) = &result.degraded_reason {
        info!("Video-only because: {}", reason);
        let video_info = probe_video(&result.path)?;
        info!(
            "{}x{}, {} frames, {:.2}s",
            video_info.width,
            video_info.height,
            video_info.frame_count,
            video_info.duration.as_secs_f64()
        );
    }

    connector.disconnect().await;
    Ok(())
}
