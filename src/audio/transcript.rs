//! Per-turn transcript accumulation.

/// Speaker attribution for a completed transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One finished line of the visible transcript log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
}

/// Accumulates partial transcription deltas for both directions of the
/// current turn. Deltas within one direction arrive strictly ordered, so
/// plain concatenation suffices.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    input: String,
    output: String,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_input(&mut self, delta: &str) {
        self.input.push_str(delta);
    }

    pub fn append_output(&mut self, delta: &str) {
        self.output.push_str(delta);
    }

    /// Emits the completed turn as a user/assistant entry pair and resets
    /// both accumulators. A turn with no accumulated text on either side
    /// still emits the pair, with empty text.
    pub fn flush_turn(&mut self) -> [TranscriptEntry; 2] {
        [
            TranscriptEntry {
                role: Role::User,
                text: std::mem::take(&mut self.input),
            },
            TranscriptEntry {
                role: Role::Assistant,
                text: std::mem::take(&mut self.output),
            },
        ]
    }
}
