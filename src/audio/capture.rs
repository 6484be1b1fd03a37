//! Microphone capture framing and outbound frame encoding.
//!
//! Raw f32 sample blocks of arbitrary size come in from the capture device;
//! fixed 4096-sample frames of base64-encoded 16-bit PCM go out to the
//! session's bounded outbound queue. The queue is drained by the connection
//! task only once the session is open, so frames captured before the open
//! handshake completes are deferred in order rather than lost.

use super::{CAPTURE_BLOCK_SAMPLES, CAPTURE_MIME_TYPE, codec};
use crate::error::LiveError;
use crate::types::{Blob, ClientMessage, RealtimeInput};
use tokio::sync::mpsc;
use tracing::{error, trace, warn};

/// A source of raw microphone samples.
///
/// `open` acquires the device and returns a receiver of f32 sample blocks at
/// 16kHz mono. Acquisition failure is [`LiveError::Permission`] and is
/// terminal for the session attempt. `close` releases the device and must
/// never fail; it is called exactly once during teardown.
pub trait CaptureSource: Send + 'static {
    fn open(&mut self) -> Result<mpsc::Receiver<Vec<f32>>, LiveError>;
    fn close(&mut self);
}

/// Frames incoming f32 samples into fixed-size encoded PCM messages.
pub struct CapturePipeline {
    pending: Vec<f32>,
    outgoing: mpsc::Sender<ClientMessage>,
}

impl CapturePipeline {
    pub fn new(outgoing: mpsc::Sender<ClientMessage>) -> Self {
        Self {
            pending: Vec::with_capacity(CAPTURE_BLOCK_SAMPLES * 2),
            outgoing,
        }
    }

    /// Accepts a block of raw samples and emits one encoded frame per full
    /// 4096-sample block accumulated so far.
    ///
    /// Send failures are logged and the frame dropped; the capture loop must
    /// never see an error from this path.
    pub fn push_samples(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= CAPTURE_BLOCK_SAMPLES {
            let block: Vec<f32> = self.pending.drain(..CAPTURE_BLOCK_SAMPLES).collect();
            let frame = encode_block(&block);
            match self.outgoing.try_send(frame) {
                Ok(()) => trace!("[Capture] Frame queued ({} samples).", CAPTURE_BLOCK_SAMPLES),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("[Capture] Outbound queue full; dropping frame.");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    error!("[Capture] Outbound queue closed; dropping frame.");
                }
            }
        }
    }
}

/// Runs the capture loop: raw sample blocks in, encoded frames out. Ends
/// when the capture source is closed and its channel drains.
pub(crate) fn spawn_capture_task(
    mut raw_rx: mpsc::Receiver<Vec<f32>>,
    outgoing: mpsc::Sender<ClientMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut pipeline = CapturePipeline::new(outgoing);
        while let Some(block) = raw_rx.recv().await {
            pipeline.push_samples(&block);
        }
        trace!("[Capture] Source channel drained; capture task exiting.");
    })
}

/// Converts one capture block to its outbound wire form: f32 -> i16 with
/// silent 16-bit wraparound on overflow, little-endian packing, base64.
fn encode_block(samples: &[f32]) -> ClientMessage {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let pcm = (sample * 32768.0) as i32 as i16;
        bytes.extend_from_slice(&pcm.to_le_bytes());
    }
    ClientMessage::RealtimeInput(RealtimeInput {
        media: Some(Blob {
            mime_type: CAPTURE_MIME_TYPE.to_string(),
            data: codec::encode_bytes(&bytes),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PLAYBACK_CHANNELS;

    fn recv_frame(rx: &mut mpsc::Receiver<ClientMessage>) -> Blob {
        match rx.try_recv().expect("expected a queued frame") {
            ClientMessage::RealtimeInput(input) => input.media.expect("frame carries media"),
            other => panic!("unexpected outbound message: {:?}", other),
        }
    }

    #[test]
    fn frames_only_on_full_blocks() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pipeline = CapturePipeline::new(tx);

        pipeline.push_samples(&vec![0.0; CAPTURE_BLOCK_SAMPLES - 1]);
        assert!(rx.try_recv().is_err(), "partial block must not emit");

        pipeline.push_samples(&vec![0.0; CAPTURE_BLOCK_SAMPLES + 1]);
        let first = recv_frame(&mut rx);
        let second = recv_frame(&mut rx);
        assert!(rx.try_recv().is_err(), "no third frame yet");

        assert_eq!(first.mime_type, CAPTURE_MIME_TYPE);
        assert_eq!(second.mime_type, CAPTURE_MIME_TYPE);
        let decoded = codec::decode_text(&first.data).unwrap();
        assert_eq!(decoded.len(), CAPTURE_BLOCK_SAMPLES * 2);
    }

    #[test]
    fn pcm_conversion_wraps_on_overflow() {
        // 1.0 scales to 32768, which wraps to i16::MIN under the reference
        // rendering policy. -1.0 maps exactly to i16::MIN.
        let frame = encode_block(&[1.0, -1.0, 0.5, 0.0]);
        let ClientMessage::RealtimeInput(input) = frame else {
            panic!("expected realtime input");
        };
        let bytes = codec::decode_text(&input.media.unwrap().data).unwrap();
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();
        assert_eq!(samples, vec![i16::MIN, i16::MIN, 16384, 0]);
    }

    #[test]
    fn full_queue_drops_frames_without_error() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut pipeline = CapturePipeline::new(tx);
        pipeline.push_samples(&vec![0.25; CAPTURE_BLOCK_SAMPLES * 3]);
        // Capacity one: the first frame is queued, the rest are dropped.
        let _ = recv_frame(&mut rx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_queue_drops_frames_without_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut pipeline = CapturePipeline::new(tx);
        pipeline.push_samples(&vec![0.25; CAPTURE_BLOCK_SAMPLES]);
    }

    #[test]
    fn silent_block_round_trips_to_silent_buffer() {
        // Capture an all-zeros block, encode it, decode it, and reconstruct
        // the playable buffer: every frame in every channel must be 0.0.
        let frame = encode_block(&vec![0.0f32; CAPTURE_BLOCK_SAMPLES]);
        let ClientMessage::RealtimeInput(input) = frame else {
            panic!("expected realtime input");
        };
        let bytes = codec::decode_text(&input.media.unwrap().data).unwrap();
        let buffer = codec::reconstruct_buffer(&bytes, 16000, PLAYBACK_CHANNELS).unwrap();
        assert_eq!(buffer.frame_count(), CAPTURE_BLOCK_SAMPLES);
        assert!(
            buffer
                .channels
                .iter()
                .all(|c| c.iter().all(|&s| s == 0.0))
        );
    }
}
