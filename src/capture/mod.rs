pub mod buffer;
pub mod frame;

pub use buffer::{FrameRecorder, RecordingStats, RecordingWindow, WindowTiming};
pub use frame::{AudioFrame, PixelFormat, RawAudioFrame, RawVideoFrame, SampleData, VideoFrame};
