use chrono::{DateTime, Utc};

/// Pixel layout of a decoded frame as delivered by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit R, G, B
    Rgb24,
    /// Packed 8-bit B, G, R
    Bgr24,
    /// Packed 8-bit R, G, B, A
    Rgba,
    /// Packed 8-bit B, G, R, A
    Bgra,
    /// Planar Y, U, V (4:2:0), planes stored back to back
    I420 {
        stride_y: u32,
        stride_u: u32,
        stride_v: u32,
    },
}

/// Decoded video frame straight off a subscribed track
#[derive(Debug, Clone)]
pub struct RawVideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawVideoFrame {
    /// Convert to tightly packed RGB24. `None` when the buffer is shorter than the layout requires.
    pub fn to_rgb24(&self) -> Option<Vec<u8>> {
        let pixels = self.width as usize * self.height as usize;
        if pixels == 0 {
            return None;
        }

        match self.format {
            PixelFormat::Rgb24 => {
                let needed = pixels * 3;
                (self.data.len() >= needed).then(|| self.data[..needed].to_vec())
            }
            PixelFormat::Bgr24 => swizzle(&self.data, pixels, 3, [2, 1, 0]),
            PixelFormat::Rgba => swizzle(&self.data, pixels, 4, [0, 1, 2]),
            PixelFormat::Bgra => swizzle(&self.data, pixels, 4, [2, 1, 0]),
            PixelFormat::I420 {
                stride_y,
                stride_u,
                stride_v,
            } => i420_to_rgb(
                &self.data,
                self.width as usize,
                self.height as usize,
                stride_y as usize,
                stride_u as usize,
                stride_v as usize,
            ),
        }
    }
}

fn swizzle(data: &[u8], pixels: usize, bpp: usize, order: [usize; 3]) -> Option<Vec<u8>> {
    if data.len() < pixels * bpp {
        return None;
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for px in data.chunks_exact(bpp).take(pixels) {
        rgb.extend_from_slice(&[px[order[0]], px[order[1]], px[order[2]]]);
    }
    Some(rgb)
}

/// BT.601 limited-range YUV -> RGB
fn i420_to_rgb(
    data: &[u8],
    width: usize,
    height: usize,
    stride_y: usize,
    stride_u: usize,
    stride_v: usize,
) -> Option<Vec<u8>> {
    if stride_y < width || stride_u < (width + 1) / 2 || stride_v < (width + 1) / 2 {
        return None;
    }

    let chroma_rows = (height + 1) / 2;
    let y_len = stride_y * height;
    let u_len = stride_u * chroma_rows;
    let v_len = stride_v * chroma_rows;
    if data.len() < y_len + u_len + v_len {
        return None;
    }

    let (y_plane, rest) = data.split_at(y_len);
    let (u_plane, rest) = rest.split_at(u_len);
    let v_plane = &rest[..v_len];

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in 0..height {
        for col in 0..width {
            let c = y_plane[row * stride_y + col] as i32 - 16;
            let d = u_plane[(row / 2) * stride_u + col / 2] as i32 - 128;
            let e = v_plane[(row / 2) * stride_v + col / 2] as i32 - 128;

            let r = (298 * c + 409 * e + 128) >> 8;
            let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
            let b = (298 * c + 516 * d + 128) >> 8;

            rgb.push(r.clamp(0, 255) as u8);
            rgb.push(g.clamp(0, 255) as u8);
            rgb.push(b.clamp(0, 255) as u8);
        }
    }
    Some(rgb)
}

/// Video frame normalised to packed RGB24, stamped at capture
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB24, `width * height * 3` bytes
    pub rgb: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// Sample encoding of a decoded audio frame
#[derive(Debug, Clone)]
pub enum SampleData {
    /// Signed 16-bit PCM, interleaved
    I16(Vec<i16>),
    /// 32-bit float in [-1.0, 1.0], interleaved
    F32(Vec<f32>),
}

/// Decoded audio frame straight off a subscribed track
#[derive(Debug, Clone)]
pub struct RawAudioFrame {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: SampleData,
}

impl RawAudioFrame {
    pub fn to_i16(&self) -> Vec<i16> {
        match &self.samples {
            SampleData::I16(samples) => samples.clone(),
            SampleData::F32(samples) => samples
                .iter()
                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .collect(),
        }
    }
}

/// Audio sample data (16-bit PCM, interleaved), stamped at capture
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    pub captured_at: DateTime<Utc>,
}
