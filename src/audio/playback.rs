//! Gapless playback scheduling with barge-in flushing.
//!
//! Inbound chunks are anchored back-to-back on the output clock: each chunk
//! starts exactly where the previous one ends, or at the clock's current time
//! if the queue has drained. An interruption signal stops everything that is
//! scheduled and resets the clock cursor, so the next chunk re-anchors fresh.

use super::codec::AudioBuffer;
use crate::error::LiveError;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Handle to one scheduled-but-not-finished playback source.
pub type SourceId = u64;

/// The output device seam.
///
/// `now` is the running output-clock time in seconds. `start_at` schedules a
/// buffer to begin at the given clock time and returns its handle; sources
/// that finish playing naturally are reported back through `take_ended` and
/// removed by the scheduler. `close` releases the device at teardown; its
/// failure is swallowed by the caller.
pub trait OutputSink: Send + 'static {
    fn now(&self) -> f64;
    fn start_at(&mut self, chunk: AudioBuffer, when: f64) -> Result<SourceId, LiveError>;
    fn stop(&mut self, id: SourceId) -> Result<(), LiveError>;
    fn close(&mut self) -> Result<(), LiveError>;

    /// Drains the ids of sources that completed since the last call.
    fn take_ended(&mut self) -> Vec<SourceId> {
        Vec::new()
    }
}

/// Schedules decoded chunks contiguously on an [`OutputSink`].
///
/// The clock cursor and active-source set form one logical unit, mutated only
/// through the entry points below.
pub struct PlaybackScheduler<S: OutputSink> {
    sink: S,
    next_start_time: f64,
    active: HashSet<SourceId>,
}

impl<S: OutputSink> PlaybackScheduler<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            next_start_time: 0.0,
            active: HashSet::new(),
        }
    }

    /// Schedules one decoded chunk to play immediately after everything
    /// already queued, never before the clock's current time.
    pub fn handle_chunk(&mut self, chunk: AudioBuffer) -> Result<(), LiveError> {
        self.reap_ended();
        let start = self.next_start_time.max(self.sink.now());
        let duration = chunk.duration();
        let id = self.sink.start_at(chunk, start)?;
        self.active.insert(id);
        self.next_start_time = start + duration;
        debug!(
            "[Playback] Scheduled source {} at {:.3}s for {:.3}s ({} active).",
            id,
            start,
            duration,
            self.active.len()
        );
        Ok(())
    }

    /// Removes a source that finished playing naturally. Unknown ids (e.g.
    /// sources already flushed by an interruption) are ignored.
    pub fn handle_ended(&mut self, id: SourceId) {
        self.active.remove(&id);
    }

    /// Polls the sink for sources that completed since the last call.
    pub fn reap_ended(&mut self) {
        for id in self.sink.take_ended() {
            self.handle_ended(id);
        }
    }

    /// Barge-in: stops every pending or playing source and resets the clock
    /// cursor to zero. Stop failures on already-finished sources are ignored.
    pub fn handle_interruption(&mut self) {
        let flushed = self.active.len();
        for id in self.active.drain() {
            if let Err(e) = self.sink.stop(id) {
                warn!("[Playback] Ignoring stop failure for source {}: {}", id, e);
            }
        }
        self.next_start_time = 0.0;
        debug!("[Playback] Interrupted; flushed {} sources.", flushed);
    }

    /// True when nothing is scheduled or playing.
    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Clock time at which the next chunk would start, before anchoring to
    /// the sink's current time.
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Releases the underlying output device. Teardown path only.
    pub fn close_sink(&mut self) -> Result<(), LiveError> {
        self.sink.close()
    }
}
