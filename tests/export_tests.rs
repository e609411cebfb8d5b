// Integration tests for exporting recording windows
//
// Windows are filled through a FrameRecorder and exported with either no
// muxer, a muxer that always fails, or the system ffmpeg when there is one.

mod support;

use anyhow::Result;
use avatar_recorder::export::Muxer;
use avatar_recorder::{probe_video, ExportResult, FrameRecorder};
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use support::{audio_frame, exporter, system_muxer, video_frame};
use tempfile::TempDir;

/// Record `video` frames and `audio` 10ms frames under `task_id`
async fn record(
    dir: &Path,
    muxer: Muxer,
    task_id: &str,
    video: u32,
    audio: u32,
) -> Result<Option<ExportResult>> {
    let recorder = FrameRecorder::new(exporter(dir, muxer));
    recorder.start_recording(task_id).await?;
    for i in 0..video {
        recorder.on_video_frame(video_frame(64, 48, i)).await;
    }
    for i in 0..audio {
        recorder.on_audio_frame(audio_frame(i)).await;
    }
    Ok(recorder.stop_recording().await?)
}

fn file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        names.push(entry?.file_name().to_string_lossy().to_string());
    }
    names.sort();
    Ok(names)
}

#[tokio::test]
async fn test_video_only_export_duration_matches_frame_count() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let result = record(temp_dir.path(), Muxer::unavailable(), "task-dur", 60, 200)
        .await?
        .expect("frames captured");

    assert!(!result.has_audio);
    assert!(result.degraded_reason.is_some());
    assert_eq!(result.video_frames, 60);
    assert_eq!(result.audio_frames, 200);
    assert!((result.duration_secs - 2.0).abs() < 1e-9);

    let name = result.path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("avatar_response_"), "got {}", name);
    assert!(name.ends_with("_task-dur_video_only.avi"), "got {}", name);

    let info = probe_video(&result.path)?;
    assert_eq!(info.frame_count, 60);
    assert_eq!(info.fps, 30.0);
    assert!((info.duration.as_secs_f64() - 2.0).abs() < 0.01);

    // The audio intermediate is kept beside the fallback
    let names = file_names(temp_dir.path())?;
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|n| n.ends_with(".wav")));

    Ok(())
}

#[tokio::test]
async fn test_silent_window_exports_video_only() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let result = record(temp_dir.path(), Muxer::unavailable(), "task-silent", 15, 0)
        .await?
        .expect("frames captured");

    assert!(!result.has_audio);
    assert_eq!(result.degraded_reason.as_deref(), Some("no audio captured"));
    assert_eq!(file_names(temp_dir.path())?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_task_id_is_sanitized_in_file_name() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let result = record(temp_dir.path(), Muxer::unavailable(), "a/b c", 3, 0)
        .await?
        .expect("frames captured");

    assert_eq!(result.path.parent(), Some(temp_dir.path()));
    let name = result.path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.contains("_a_b_c_"), "got {}", name);

    Ok(())
}

#[tokio::test]
async fn test_failing_muxer_degrades_to_video_only() -> Result<()> {
    let Ok(false_bin) = which::which("false") else {
        eprintln!("skipping: no `false` binary on PATH");
        return Ok(());
    };
    let temp_dir = TempDir::new()?;
    let muxer = Muxer::locate(false_bin.to_str(), Duration::from_secs(5));
    assert!(muxer.is_available());

    let result = record(temp_dir.path(), muxer, "task-failmux", 30, 100)
        .await?
        .expect("frames captured");

    assert!(!result.has_audio);
    assert!(result
        .degraded_reason
        .as_deref()
        .is_some_and(|r| r.starts_with("muxer failed")));
    assert!(result.path.exists());
    assert!(
        !file_names(temp_dir.path())?.iter().any(|n| n.ends_with(".mkv")),
        "No combined file should be left behind"
    );

    Ok(())
}

#[tokio::test]
async fn test_ffmpeg_combines_audio_and_video() -> Result<()> {
    let Some(muxer) = system_muxer() else {
        eprintln!("skipping: ffmpeg not installed");
        return Ok(());
    };
    let temp_dir = TempDir::new()?;

    let result = record(temp_dir.path(), muxer, "task-mux", 45, 150)
        .await?
        .expect("frames captured");

    assert!(result.has_audio, "reason: {:?}", result.degraded_reason);
    assert!(result.degraded_reason.is_none());
    assert_eq!(result.path.extension().and_then(|e| e.to_str()), Some("mkv"));
    assert!(std::fs::metadata(&result.path)?.len() > 1024);

    // Intermediates are cleaned up once combined
    let names = file_names(temp_dir.path())?;
    assert_eq!(names.len(), 1, "left behind: {:?}", names);

    if let Ok(ffprobe) = which::which("ffprobe") {
        let output = Command::new(ffprobe)
            .args(["-v", "error", "-show_entries", "stream=codec_type", "-of", "csv=p=0"])
            .arg(&result.path)
            .output()?;
        let streams = String::from_utf8_lossy(&output.stdout);
        assert!(streams.lines().any(|l| l.trim() == "video"), "{}", streams);
        assert!(streams.lines().any(|l| l.trim() == "audio"), "{}", streams);
    }

    Ok(())
}
