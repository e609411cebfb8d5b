use crate::capture::AudioFrame;
use crate::error::ExportError;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::warn;

/// What ended up in a written WAV file
#[derive(Debug, Clone)]
pub struct AudioMetadata {
    pub file_path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples written
    pub sample_count: usize,
    pub frames_written: usize,
    /// Frames skipped because their rate or channel count differed from the first frame
    pub frames_dropped: usize,
}

impl AudioMetadata {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.sample_count as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// 16-bit PCM WAV writer pinned to the format of its first frame
pub struct WavFileWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    metadata: AudioMetadata,
}

impl WavFileWriter {
    pub fn create(file_path: &Path, sample_rate: u32, channels: u16) -> Result<Self, ExportError> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(file_path, spec)?;

        Ok(Self {
            writer: Some(writer),
            metadata: AudioMetadata {
                file_path: file_path.to_path_buf(),
                sample_rate,
                channels,
                sample_count: 0,
                frames_written: 0,
                frames_dropped: 0,
            },
        })
    }

    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<(), ExportError> {
        if frame.sample_rate != self.metadata.sample_rate
            || frame.channels != self.metadata.channels
        {
            self.metadata.frames_dropped += 1;
            return Ok(());
        }

        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer.write_sample(sample)?;
            }

            self.metadata.sample_count += frame.samples.len();
            self.metadata.frames_written += 1;
        }

        Ok(())
    }

    pub fn finish(mut self) -> Result<AudioMetadata, ExportError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }

        if self.metadata.frames_dropped > 0 {
            warn!(
                "Dropped {} audio frames with a format other than {} Hz / {} ch",
                self.metadata.frames_dropped, self.metadata.sample_rate, self.metadata.channels
            );
        }

        Ok(self.metadata.clone())
    }
}

impl Drop for WavFileWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

/// Write `frames` to a WAV at `path` using the first frame's format.
///
/// Returns `None` when there is nothing to write.
pub fn write_audio(path: &Path, frames: &[AudioFrame]) -> Result<Option<AudioMetadata>, ExportError> {
    let Some(first) = frames.first() else {
        return Ok(None);
    };

    let mut writer = WavFileWriter::create(path, first.sample_rate, first.channels)?;
    for frame in frames {
        writer.write_frame(frame)?;
    }
    writer.finish().map(Some)
}
