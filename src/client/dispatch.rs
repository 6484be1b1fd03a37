//! Inbound event dispatch and session teardown.
//!
//! One task owns every session resource: the playback scheduler (and through
//! it the output device), the transcript aggregator, and the capture source.
//! It reacts to connection events and the stop signal, and runs teardown
//! exactly once no matter which trigger fires first.

use super::handle::SessionState;
use crate::audio::{
    CaptureSource, OutputSink, PLAYBACK_CHANNELS, PLAYBACK_SAMPLE_RATE_HZ, PlaybackScheduler,
    TranscriptAggregator, TranscriptEntry, codec,
};
use crate::error::LiveError;
use crate::types::{ServerContent, ServerMessage};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Events delivered by the connection task.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    Open,
    Message(ServerMessage),
    Error(LiveError),
    Closed,
}

pub(crate) struct Dispatcher<C: CaptureSource, S: OutputSink> {
    scheduler: PlaybackScheduler<S>,
    transcripts: TranscriptAggregator,
    transcript_tx: mpsc::UnboundedSender<TranscriptEntry>,
    capture_source: Option<C>,
    state_tx: watch::Sender<SessionState>,
    torn_down: bool,
}

impl<C: CaptureSource, S: OutputSink> Dispatcher<C, S> {
    pub(crate) fn new(
        sink: S,
        capture_source: C,
        transcript_tx: mpsc::UnboundedSender<TranscriptEntry>,
        state_tx: watch::Sender<SessionState>,
    ) -> Self {
        Self {
            scheduler: PlaybackScheduler::new(sink),
            transcripts: TranscriptAggregator::new(),
            transcript_tx,
            capture_source: Some(capture_source),
            state_tx,
            torn_down: false,
        }
    }

    /// Handles one connection event. Returns `true` when the session is over
    /// and the loop should tear down and exit.
    pub(crate) fn handle_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Open => {
                info!("[Session] Open; capture frames are now being streamed.");
                let _ = self.state_tx.send(SessionState::Open);
                false
            }
            SessionEvent::Message(message) => {
                if let Some(content) = message.server_content {
                    self.handle_server_content(content);
                }
                false
            }
            SessionEvent::Error(e) => {
                error!("[Session] Connection error: {}", e);
                true
            }
            SessionEvent::Closed => {
                info!("[Session] Connection closed by backend.");
                true
            }
        }
    }

    /// Dispatches every field of one inbound content union independently.
    /// Fixed handling order: transcription deltas, turn flush, audio parts,
    /// interruption.
    fn handle_server_content(&mut self, content: ServerContent) {
        self.scheduler.reap_ended();

        if let Some(t) = &content.input_transcription {
            self.transcripts.append_input(&t.text);
        }
        if let Some(t) = &content.output_transcription {
            self.transcripts.append_output(&t.text);
        }

        if content.turn_complete == Some(true) {
            debug!("[Session] Turn complete; flushing transcript pair.");
            for entry in self.transcripts.flush_turn() {
                let _ = self.transcript_tx.send(entry);
            }
        }

        if let Some(turn) = &content.model_turn {
            for part in &turn.parts {
                let Some(blob) = &part.inline_data else {
                    continue;
                };
                match codec::decode_text(&blob.data).and_then(|bytes| {
                    codec::reconstruct_buffer(&bytes, PLAYBACK_SAMPLE_RATE_HZ, PLAYBACK_CHANNELS)
                }) {
                    Ok(buffer) => {
                        if let Err(e) = self.scheduler.handle_chunk(buffer) {
                            warn!("[Session] Failed to schedule audio chunk: {}", e);
                        }
                    }
                    // Malformed payloads drop the chunk, not the session.
                    Err(e) => warn!("[Session] Dropping undecodable audio chunk: {}", e),
                }
            }
        }

        if content.interrupted == Some(true) {
            self.scheduler.handle_interruption();
        }
    }

    /// Releases every session resource: microphone, pending playback, output
    /// device. Runs at most once; failures are logged and swallowed so
    /// cleanup always completes.
    pub(crate) fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        info!("[Session] Tearing down.");

        if let Some(mut source) = self.capture_source.take() {
            source.close();
        }
        self.scheduler.handle_interruption();
        if let Err(e) = self.scheduler.close_sink() {
            warn!("[Session] Ignoring output close failure: {}", e);
        }
        let _ = self.state_tx.send(SessionState::Closed);
    }
}

/// Runs the dispatch loop until the stop signal fires or the connection ends,
/// then tears down.
pub(crate) async fn run_dispatch_loop<C: CaptureSource, S: OutputSink>(
    mut dispatcher: Dispatcher<C, S>,
    mut events_rx: mpsc::Receiver<SessionEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("[Session] Stop requested.");
                break;
            }
            maybe_event = events_rx.recv() => match maybe_event {
                Some(event) => {
                    if dispatcher.handle_event(event) {
                        break;
                    }
                }
                None => break,
            },
        }
    }
    dispatcher.teardown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::CAPTURE_BLOCK_SAMPLES;
    use crate::audio::playback::testing::FakeSink;
    use crate::types::{Blob, ModelTurn, Part, Transcription};
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use tokio::time::{Duration, timeout};

    struct FakeCapture {
        closes: Arc<AtomicUsize>,
        raw_tx: Option<mpsc::Sender<Vec<f32>>>,
    }

    impl FakeCapture {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    closes: closes.clone(),
                    raw_tx: None,
                },
                closes,
            )
        }
    }

    impl CaptureSource for FakeCapture {
        fn open(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, LiveError> {
            let (tx, rx) = mpsc::channel(4);
            self.raw_tx = Some(tx);
            Ok(rx)
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.raw_tx.take();
        }
    }

    fn new_dispatcher(
        sink: FakeSink,
    ) -> (
        Dispatcher<FakeCapture, FakeSink>,
        mpsc::UnboundedReceiver<TranscriptEntry>,
        watch::Receiver<SessionState>,
        Arc<AtomicUsize>,
    ) {
        let (capture, closes) = FakeCapture::new();
        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        (
            Dispatcher::new(sink, capture, transcript_tx, state_tx),
            transcript_rx,
            state_rx,
            closes,
        )
    }

    fn audio_part(bytes: &[u8]) -> Part {
        Part {
            inline_data: Some(Blob {
                mime_type: "audio/pcm;rate=24000".to_string(),
                data: codec::encode_bytes(bytes),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn combined_message_handles_every_field() {
        let sink = FakeSink::default();
        let (mut dispatcher, mut transcript_rx, _state, _) = new_dispatcher(sink.clone());

        dispatcher.handle_server_content(ServerContent {
            input_transcription: Some(Transcription {
                text: "hello".to_string(),
            }),
            output_transcription: Some(Transcription {
                text: "hi".to_string(),
            }),
            turn_complete: Some(true),
            model_turn: Some(ModelTurn {
                parts: vec![audio_part(&vec![0u8; CAPTURE_BLOCK_SAMPLES * 2])],
            }),
            interrupted: Some(true),
        });

        // Turn flush happened with the deltas from this same message.
        let user = transcript_rx.try_recv().unwrap();
        let assistant = transcript_rx.try_recv().unwrap();
        assert_eq!(user.text, "hello");
        assert_eq!(assistant.text, "hi");
        // The chunk was scheduled, then the interruption flushed it.
        assert_eq!(sink.starts().len(), 1);
        assert_eq!(sink.stopped().len(), 1);
    }

    #[test]
    fn undecodable_chunk_is_dropped_without_killing_session() {
        let sink = FakeSink::default();
        let (mut dispatcher, _rx, _state, _) = new_dispatcher(sink.clone());

        dispatcher.handle_server_content(ServerContent {
            model_turn: Some(ModelTurn {
                parts: vec![
                    Part {
                        inline_data: Some(Blob {
                            mime_type: "audio/pcm;rate=24000".to_string(),
                            data: "!!!not-base64!!!".to_string(),
                        }),
                        ..Default::default()
                    },
                    audio_part(&[0u8, 0, 0, 0]),
                ],
            }),
            ..Default::default()
        });

        // The malformed part was skipped, the valid one scheduled.
        assert_eq!(sink.starts().len(), 1);
    }

    #[test]
    fn teardown_runs_exactly_once() {
        let sink = FakeSink::default();
        let (mut dispatcher, _rx, state_rx, closes) = new_dispatcher(sink.clone());

        dispatcher.teardown();
        dispatcher.teardown();

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(sink.closed_count(), 1);
        assert_eq!(*state_rx.borrow(), SessionState::Closed);
    }

    #[tokio::test]
    async fn stop_signal_ends_loop_and_tears_down() {
        let sink = FakeSink::default();
        let (dispatcher, _rx, mut state_rx, closes) = new_dispatcher(sink.clone());
        let (events_tx, events_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_dispatch_loop(dispatcher, events_rx, shutdown_rx));
        events_tx.send(SessionEvent::Open).await.unwrap();
        shutdown_tx.send(()).unwrap();

        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(sink.closed_count(), 1);
        assert!(state_rx.wait_for(|s| *s == SessionState::Closed).await.is_ok());
    }

    #[tokio::test]
    async fn connection_error_ends_loop_and_tears_down() {
        let sink = FakeSink::default();
        let (dispatcher, _rx, _state, closes) = new_dispatcher(sink.clone());
        let (events_tx, events_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run_dispatch_loop(dispatcher, events_rx, shutdown_rx));
        events_tx
            .send(SessionEvent::Error(LiveError::Connection(
                "socket reset".to_string(),
            )))
            .await
            .unwrap();

        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(sink.closed_count(), 1);
    }

    #[test]
    fn open_event_publishes_open_state() {
        let sink = FakeSink::default();
        let (mut dispatcher, _rx, state_rx, _) = new_dispatcher(sink);
        assert!(!dispatcher.handle_event(SessionEvent::Open));
        assert_eq!(*state_rx.borrow(), SessionState::Open);
    }
}
