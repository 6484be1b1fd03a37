//! Session configuration and startup wiring.

use super::connection;
use super::dispatch::{self, Dispatcher};
use super::handle::{LiveSession, SessionState};
use crate::audio::{CaptureSource, OutputSink, TranscriptEntry, capture};
use crate::error::LiveError;
use crate::types::{
    AudioTranscriptionConfig, Content, GenerationConfig, Part, PrebuiltVoiceConfig,
    ResponseModality, SessionSetup, SpeechConfig, VoiceConfig,
};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

/// Default model for native audio dialog.
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";
/// Default prebuilt voice.
pub const DEFAULT_VOICE: &str = "Zephyr";
/// Default behavioral instruction for the assistant.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are Chatonn, a helpful AI. Keep responses brief and spoken-word friendly.";

/// Capacity of the bounded outbound frame queue. Frames captured before the
/// session opens are held here in order; overflow drops the newest frame.
const OUTBOUND_QUEUE_FRAMES: usize = 64;
const EVENT_QUEUE_MESSAGES: usize = 32;

/// Builds and starts a live voice session.
pub struct LiveSessionBuilder {
    api_key: String,
    model: String,
    voice_name: String,
    system_instruction: String,
    input_transcription: bool,
    output_transcription: bool,
}

impl LiveSessionBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            voice_name: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            input_transcription: true,
            output_transcription: true,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn voice(mut self, voice_name: impl Into<String>) -> Self {
        self.voice_name = voice_name.into();
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn input_transcription(mut self, enabled: bool) -> Self {
        self.input_transcription = enabled;
        self
    }

    pub fn output_transcription(mut self, enabled: bool) -> Self {
        self.output_transcription = enabled;
        self
    }

    fn build_setup(&self) -> SessionSetup {
        SessionSetup {
            model: self.model.clone(),
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec![ResponseModality::Audio]),
                speech_config: Some(SpeechConfig {
                    voice_config: Some(VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice_name.clone(),
                        },
                    }),
                }),
            }),
            system_instruction: Some(Content {
                parts: vec![Part {
                    text: Some(self.system_instruction.clone()),
                    ..Default::default()
                }],
                role: Some("system".to_string()),
            }),
            input_audio_transcription: self
                .input_transcription
                .then(|| AudioTranscriptionConfig {}),
            output_audio_transcription: self
                .output_transcription
                .then(|| AudioTranscriptionConfig {}),
        }
    }

    /// Acquires the microphone, opens the bidirectional connection, and wires
    /// capture, dispatch, and playback together.
    ///
    /// Fails with [`LiveError::Permission`] if the capture device cannot be
    /// acquired; that failure is terminal for the attempt and is never
    /// retried here. Returns the session handle and the receiver on which
    /// completed transcript turn pairs are delivered.
    pub async fn start<C, S>(
        self,
        mut capture_source: C,
        output_sink: S,
    ) -> Result<(LiveSession, mpsc::UnboundedReceiver<TranscriptEntry>), LiveError>
    where
        C: CaptureSource,
        S: OutputSink,
    {
        let setup = self.build_setup();
        let raw_rx = capture_source.open()?;
        info!("[Builder] Capture device acquired; connecting.");

        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTBOUND_QUEUE_FRAMES);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_MESSAGES);
        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        connection::spawn_connection_task(self.api_key, setup, outgoing_rx, events_tx);

        // Capture starts immediately; its frames sit in the bounded outbound
        // queue until the connection task finishes the open handshake, which
        // preserves strict send order across the open boundary.
        capture::spawn_capture_task(raw_rx, outgoing_tx);

        let dispatcher = Dispatcher::new(output_sink, capture_source, transcript_tx, state_tx);
        tokio::spawn(dispatch::run_dispatch_loop(
            dispatcher,
            events_rx,
            shutdown_rx,
        ));

        Ok((
            LiveSession {
                shutdown_tx: Arc::new(TokioMutex::new(Some(shutdown_tx))),
                state_rx,
            },
            transcript_rx,
        ))
    }
}
