//! Real-time voice session pipeline for the Chatonn assistant.
//!
//! Streams microphone audio to a generative-AI backend over a bidirectional
//! WebSocket session and plays the synthesized reply back gaplessly, with
//! barge-in interruption and per-turn transcript aggregation.
//!
//! The pipeline, leaves first:
//! - [`audio::codec`] — PCM <-> base64 conversion and playable-buffer
//!   reconstruction.
//! - [`audio::capture`] — fixed-block framing of microphone samples into
//!   outbound encoded frames.
//! - [`audio::playback`] — contiguous scheduling of inbound audio chunks on
//!   an output clock, flushed on interruption.
//! - [`audio::transcript`] — per-turn accumulation of transcription deltas.
//! - [`client`] — the session lifecycle: builder, WebSocket connection task,
//!   inbound dispatch, and the stop/teardown handle.
//!
//! Device integration stays behind the [`audio::CaptureSource`] and
//! [`audio::OutputSink`] traits; see `demos/voice_chat.rs` for a cpal-backed
//! wiring of both.

pub mod audio;
pub mod client;
pub mod error;
pub mod types;

pub use audio::{
    AudioBuffer, CapturePipeline, CaptureSource, OutputSink, PlaybackScheduler, Role, SourceId,
    TranscriptAggregator, TranscriptEntry,
};
pub use client::{LiveSession, LiveSessionBuilder, SessionState};
pub use error::LiveError;
