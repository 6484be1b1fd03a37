pub mod capture;
pub mod codec;
pub mod playback;
pub mod transcript;

pub use capture::{CapturePipeline, CaptureSource};
pub use codec::AudioBuffer;
pub use playback::{OutputSink, PlaybackScheduler, SourceId};
pub use transcript::{Role, TranscriptAggregator, TranscriptEntry};

/// Sample rate (16kHz) of the capture side of the session.
pub const CAPTURE_SAMPLE_RATE_HZ: u32 = 16000;
/// Number of capture channels (mono).
pub const CAPTURE_CHANNELS: u16 = 1;
/// Fixed block size, in samples, at which captured audio is framed and sent.
pub const CAPTURE_BLOCK_SAMPLES: usize = 4096;
/// Sample rate (24kHz) of audio synthesized by the backend.
pub const PLAYBACK_SAMPLE_RATE_HZ: u32 = 24000;
/// Number of playback channels (mono).
pub const PLAYBACK_CHANNELS: u16 = 1;
/// MIME tag attached to every outbound capture frame.
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";
