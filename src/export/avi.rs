//! Motion-JPEG AVI container
//!
//! Frames are JPEG-encoded one by one and appended to the `movi` list. Sizes
//! and frame counts that are only known at the end are patched into the
//! header by `finish`.

use crate::capture::VideoFrame;
use crate::error::ExportError;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;

const HDRL_LIST_SIZE: u32 = 192;
const AVIH_SIZE: u32 = 56;
const STRL_LIST_SIZE: u32 = 116;
const STRH_SIZE: u32 = 56;
const STRF_SIZE: u32 = 40;

// Byte offsets of the fields patched in `finish`
const RIFF_SIZE_POS: u64 = 4;
const AVIH_MAX_BYTES_POS: u64 = 36;
const AVIH_TOTAL_FRAMES_POS: u64 = 48;
const AVIH_BUFFER_POS: u64 = 60;
const STRH_LENGTH_POS: u64 = 140;
const STRH_BUFFER_POS: u64 = 144;
const MOVI_SIZE_POS: u64 = 216;
const MOVI_FOURCC_POS: u64 = 220;
const HEADER_LEN: usize = 224;

/// Header fields read back from a written file
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub fps: f64,
    pub duration: Duration,
}

/// Streaming MJPEG/AVI writer
pub struct AviWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    width: u32,
    height: u32,
    fps: u32,
    jpeg_quality: u8,
    /// (offset from the `movi` fourcc, chunk size)
    index: Vec<(u32, u32)>,
    max_chunk: u32,
    total_bytes: u64,
    position: u64,
}

impl AviWriter {
    pub fn create(
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        jpeg_quality: u8,
    ) -> Result<Self, ExportError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer, width, height, fps)?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            width,
            height,
            fps,
            jpeg_quality,
            index: Vec::new(),
            max_chunk: 0,
            total_bytes: 0,
            position: HEADER_LEN as u64,
        })
    }

    pub fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), ExportError> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality).encode(
            &frame.rgb,
            self.width,
            self.height,
            ExtendedColorType::Rgb8,
        )?;

        let offset = self.position - MOVI_FOURCC_POS;
        let size = jpeg.len() as u32;
        let padding = u64::from(size % 2);

        self.writer.write_all(b"00dc")?;
        self.writer.write_all(&size.to_le_bytes())?;
        self.writer.write_all(&jpeg)?;
        if padding == 1 {
            self.writer.write_all(&[0])?;
        }
        self.position += 8 + u64::from(size) + padding;

        self.index.push((offset as u32, size));
        self.max_chunk = self.max_chunk.max(size);
        self.total_bytes += u64::from(size);

        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    /// Write the index, patch the header and flush
    pub fn finish(mut self) -> Result<PathBuf, ExportError> {
        let idx1_pos = self.position;

        self.writer.write_all(b"idx1")?;
        self.writer
            .write_all(&((self.index.len() * 16) as u32).to_le_bytes())?;
        for (offset, size) in &self.index {
            self.writer.write_all(b"00dc")?;
            self.writer.write_all(&AVIIF_KEYFRAME.to_le_bytes())?;
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(&size.to_le_bytes())?;
        }

        let end = idx1_pos + 8 + self.index.len() as u64 * 16;
        let frames = self.index.len() as u32;
        let buffer = self.max_chunk + 8;
        let max_bytes_per_sec = if frames == 0 {
            0
        } else {
            ((self.total_bytes / u64::from(frames)) * u64::from(self.fps)) as u32
        };

        patch(&mut self.writer, RIFF_SIZE_POS, (end - 8) as u32)?;
        patch(&mut self.writer, AVIH_MAX_BYTES_POS, max_bytes_per_sec)?;
        patch(&mut self.writer, AVIH_TOTAL_FRAMES_POS, frames)?;
        patch(&mut self.writer, AVIH_BUFFER_POS, buffer)?;
        patch(&mut self.writer, STRH_LENGTH_POS, frames)?;
        patch(&mut self.writer, STRH_BUFFER_POS, buffer)?;
        patch(
            &mut self.writer,
            MOVI_SIZE_POS,
            (idx1_pos - MOVI_FOURCC_POS) as u32,
        )?;

        self.writer.flush()?;
        debug!("Wrote {} MJPEG frames to {:?}", frames, self.path);

        Ok(self.path)
    }
}

fn patch<W: Write + Seek>(writer: &mut W, pos: u64, value: u32) -> Result<(), ExportError> {
    writer.seek(SeekFrom::Start(pos))?;
    writer.write_all(&value.to_le_bytes())?;
    writer.seek(SeekFrom::End(0))?;
    Ok(())
}

fn write_header<W: Write>(w: &mut W, width: u32, height: u32, fps: u32) -> Result<(), ExportError> {
    let micros_per_frame = 1_000_000 / fps.max(1);

    w.write_all(b"RIFF")?;
    w.write_all(&0u32.to_le_bytes())?;
    w.write_all(b"AVI ")?;

    w.write_all(b"LIST")?;
    w.write_all(&HDRL_LIST_SIZE.to_le_bytes())?;
    w.write_all(b"hdrl")?;

    // MainAVIHeader
    w.write_all(b"avih")?;
    w.write_all(&AVIH_SIZE.to_le_bytes())?;
    for value in [
        micros_per_frame,
        0, // max bytes per sec
        0, // padding granularity
        AVIF_HASINDEX,
        0, // total frames
        0, // initial frames
        1, // streams
        0, // suggested buffer size
        width,
        height,
        0,
        0,
        0,
        0,
    ] {
        w.write_all(&value.to_le_bytes())?;
    }

    w.write_all(b"LIST")?;
    w.write_all(&STRL_LIST_SIZE.to_le_bytes())?;
    w.write_all(b"strl")?;

    // AVIStreamHeader
    w.write_all(b"strh")?;
    w.write_all(&STRH_SIZE.to_le_bytes())?;
    w.write_all(b"vids")?;
    w.write_all(b"MJPG")?;
    w.write_all(&0u32.to_le_bytes())?; // flags
    w.write_all(&0u16.to_le_bytes())?; // priority
    w.write_all(&0u16.to_le_bytes())?; // language
    for value in [
        0u32, // initial frames
        1,    // scale
        fps,  // rate
        0,    // start
        0,    // length
        0,    // suggested buffer size
        u32::MAX,
        0, // sample size
    ] {
        w.write_all(&value.to_le_bytes())?;
    }
    for value in [0i16, 0, width as i16, height as i16] {
        w.write_all(&value.to_le_bytes())?;
    }

    // BITMAPINFOHEADER
    w.write_all(b"strf")?;
    w.write_all(&STRF_SIZE.to_le_bytes())?;
    w.write_all(&STRF_SIZE.to_le_bytes())?;
    w.write_all(&(width as i32).to_le_bytes())?;
    w.write_all(&(height as i32).to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&24u16.to_le_bytes())?;
    w.write_all(b"MJPG")?;
    for value in [width * height * 3, 0, 0, 0, 0] {
        w.write_all(&value.to_le_bytes())?;
    }

    w.write_all(b"LIST")?;
    w.write_all(&4u32.to_le_bytes())?;
    w.write_all(b"movi")?;

    Ok(())
}

/// Encode `frames` into an MJPEG AVI at `path`.
///
/// Every frame must already match the first frame's dimensions.
pub fn write_video(
    path: &Path,
    frames: &[VideoFrame],
    fps: u32,
    jpeg_quality: u8,
) -> Result<PathBuf, ExportError> {
    let Some(first) = frames.first() else {
        return Err(ExportError::NoVideoCaptured);
    };

    let mut writer = AviWriter::create(path, first.width, first.height, fps, jpeg_quality)?;
    for frame in frames {
        writer.write_frame(frame)?;
    }
    writer.finish()
}

/// Read the stream parameters back from an AVI written by [`AviWriter`]
pub fn probe_video(path: &Path) -> Result<VideoInfo, ExportError> {
    let mut header = [0u8; HEADER_LEN];
    File::open(path)?.read_exact(&mut header)?;

    if &header[0..4] != b"RIFF" || &header[8..12] != b"AVI " || &header[24..28] != b"avih" {
        return Err(ExportError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} is not an AVI file", path.display()),
        )));
    }

    let read_u32 = |pos: usize| {
        u32::from_le_bytes([header[pos], header[pos + 1], header[pos + 2], header[pos + 3]])
    };

    let micros_per_frame = read_u32(32);
    let frame_count = read_u32(48);
    let width = read_u32(64);
    let height = read_u32(68);
    let scale = read_u32(128).max(1);
    let rate = read_u32(132);

    Ok(VideoInfo {
        width,
        height,
        frame_count,
        fps: f64::from(rate) / f64::from(scale),
        duration: Duration::from_micros(u64::from(micros_per_frame) * u64::from(frame_count)),
    })
}
