//! PCM byte <-> transport text codec and playable buffer reconstruction.

use crate::error::LiveError;
use base64::Engine as _;

/// A decoded, de-interleaved audio buffer ready for scheduling.
///
/// One inner `Vec<f32>` per channel, every channel holding the same number of
/// frames, samples normalized to [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Number of frames per channel.
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    /// Playback duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

/// Encodes raw bytes into the transport-safe text form (base64).
pub fn encode_bytes(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Inverse of [`encode_bytes`]. Fails with [`LiveError::Decode`] on malformed
/// input.
pub fn decode_text(text: &str) -> Result<Vec<u8>, LiveError> {
    Ok(base64::engine::general_purpose::STANDARD.decode(text)?)
}

/// Reinterprets `bytes` as interleaved little-endian 16-bit signed PCM and
/// builds an [`AudioBuffer`] of `bytes.len() / 2 / channel_count` frames per
/// channel at `sample_rate`. Each sample is normalized by dividing by 32768.
///
/// No resampling is performed; the caller must supply the correct rate.
pub fn reconstruct_buffer(
    bytes: &[u8],
    sample_rate: u32,
    channel_count: u16,
) -> Result<AudioBuffer, LiveError> {
    if channel_count == 0 {
        return Err(LiveError::Decode("channel count must be non-zero".into()));
    }
    if bytes.len() % 2 != 0 {
        return Err(LiveError::Decode(format!(
            "PCM payload has odd byte length {}",
            bytes.len()
        )));
    }

    let channel_count = channel_count as usize;
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let frame_count = samples.len() / channel_count;

    let mut channels = vec![Vec::with_capacity(frame_count); channel_count];
    for (channel, buf) in channels.iter_mut().enumerate() {
        for frame in 0..frame_count {
            buf.push(samples[frame * channel_count + channel] as f32 / 32768.0);
        }
    }

    Ok(AudioBuffer {
        channels,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::CAPTURE_BLOCK_SAMPLES;

    #[test]
    fn encode_decode_round_trips_exactly() {
        for bytes in [
            Vec::new(),
            vec![0u8],
            vec![0xFF, 0x00, 0x7F, 0x80],
            (0..=255u8).cycle().take(CAPTURE_BLOCK_SAMPLES * 2).collect(),
        ] {
            let text = encode_bytes(&bytes);
            assert_eq!(decode_text(&text).unwrap(), bytes);
        }
    }

    #[test]
    fn decode_rejects_malformed_text() {
        let result = decode_text("not!valid@base64~");
        assert!(matches!(result, Err(LiveError::Decode(_))));
    }

    #[test]
    fn reconstruct_normalizes_and_deinterleaves() {
        // Two stereo frames: (16384, -16384), (32767, -32768).
        let mut bytes = Vec::new();
        for s in [16384i16, -16384, 32767, -32768] {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        let buffer = reconstruct_buffer(&bytes, 24000, 2).unwrap();
        assert_eq!(buffer.frame_count(), 2);
        assert_eq!(buffer.channels.len(), 2);
        assert_eq!(buffer.channels[0], vec![0.5, 32767.0 / 32768.0]);
        assert_eq!(buffer.channels[1], vec![-0.5, -1.0]);
    }

    #[test]
    fn reconstruct_rejects_odd_byte_length() {
        let result = reconstruct_buffer(&[0u8, 1, 2], 24000, 1);
        assert!(matches!(result, Err(LiveError::Decode(_))));
    }

    #[test]
    fn reconstruct_rejects_zero_channels() {
        let result = reconstruct_buffer(&[0u8, 0], 24000, 0);
        assert!(matches!(result, Err(LiveError::Decode(_))));
    }

    #[test]
    fn duration_counts_frames_per_channel() {
        let bytes = vec![0u8; 24000 * 2]; // one second of mono 24kHz
        let buffer = reconstruct_buffer(&bytes, 24000, 1).unwrap();
        assert!((buffer.duration() - 1.0).abs() < f64::EPSILON);
    }
}
