//! Gapless playback scheduling of received audio.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use super::codec::{decode_base64, dequantize_pcm16};
use super::output::OutputSink;
use super::types::{AudioChunk, BufferId, PlaybackBuffer};
use crate::error::LiveError;

/// Fired by an [`OutputSink`] when a buffer finishes playing on its own.
#[derive(Debug)]
pub struct CompletionHook {
    id: BufferId,
    tx: mpsc::UnboundedSender<BufferId>,
}

impl CompletionHook {
    pub fn new(id: BufferId, tx: mpsc::UnboundedSender<BufferId>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn notify(self) {
        let _ = self.tx.send(self.id);
    }
}

/// A buffer scheduled on the output clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackHandle {
    pub id: BufferId,
    pub start_at: f64,
    pub duration: f64,
}

/// Decode received chunks and schedule them back to back on one output sink.
///
/// Each buffer starts at `max(cursor, now)` and the cursor then advances by
/// the buffer's duration, so scheduled buffers never overlap and play in
/// schedule order.
pub struct PlaybackScheduler {
    sink: Box<dyn OutputSink>,
    cursor: f64,
    next_id: u64,
    active: BTreeMap<BufferId, PlaybackHandle>,
    completions_tx: mpsc::UnboundedSender<BufferId>,
}

impl PlaybackScheduler {
    /// `completions_tx` receives the id of every buffer that ends naturally.
    pub fn new(sink: Box<dyn OutputSink>, completions_tx: mpsc::UnboundedSender<BufferId>) -> Self {
        Self {
            sink,
            cursor: 0.0,
            next_id: 0,
            active: BTreeMap::new(),
            completions_tx,
        }
    }

    /// Decode a transport-encoded chunk into a playable buffer.
    ///
    /// A zero sample rate is rejected: such a buffer has no duration and would
    /// overlap whatever is scheduled after it.
    pub fn decode(chunk: &AudioChunk) -> Result<PlaybackBuffer, LiveError> {
        if chunk.format.sample_rate == 0 {
            return Err(LiveError::Decode(
                "Audio payload has a zero sample rate".to_string(),
            ));
        }
        let bytes = decode_base64(&chunk.data)?;
        let channels = dequantize_pcm16(&bytes, chunk.format.channels)?;
        let buffer = PlaybackBuffer {
            format: chunk.format,
            channels,
        };
        if buffer.frame_count() == 0 {
            return Err(LiveError::Decode(
                "Audio payload contains no complete frames".to_string(),
            ));
        }
        Ok(buffer)
    }

    /// Decode and schedule in one step.
    pub fn enqueue(&mut self, chunk: &AudioChunk) -> Result<PlaybackHandle, LiveError> {
        let buffer = Self::decode(chunk)?;
        Ok(self.schedule(buffer))
    }

    /// Schedule a decoded buffer right after everything already scheduled.
    pub fn schedule(&mut self, buffer: PlaybackBuffer) -> PlaybackHandle {
        let start_at = self.cursor.max(self.sink.current_time());
        let duration = buffer.duration();
        let id = BufferId(self.next_id);
        self.next_id += 1;

        let hook = CompletionHook::new(id, self.completions_tx.clone());
        self.sink.start(buffer, start_at, hook);
        self.cursor = start_at + duration;

        let handle = PlaybackHandle {
            id,
            start_at,
            duration,
        };
        self.active.insert(id, handle);
        handle
    }

    /// Drop a naturally finished buffer from the active set.
    ///
    /// Returns `false` for ids that were already stopped or never scheduled.
    pub fn finished(&mut self, id: BufferId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Cancel all scheduled playback and restart scheduling from the clock.
    ///
    /// Returns the number of buffers stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.stop_all();
        self.cursor = self.sink.current_time();
        stopped
    }

    /// Force-stop every active buffer and clear the set.
    pub fn stop_all(&mut self) -> usize {
        let active = std::mem::take(&mut self.active);
        for id in active.keys() {
            self.sink.stop(*id);
        }
        active.len()
    }

    /// Next available start time.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn current_time(&self) -> f64 {
        self.sink.current_time()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: BufferId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn active(&self) -> impl Iterator<Item = &PlaybackHandle> {
        self.active.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::{encode_base64, quantize_pcm16};
    use crate::audio::output::{Speaker, VirtualSpeaker};
    use crate::audio::types::PcmFormat;

    const RATE: u32 = 24_000;

    fn scheduler() -> (
        PlaybackScheduler,
        VirtualSpeaker,
        mpsc::UnboundedReceiver<BufferId>,
    ) {
        let speaker = VirtualSpeaker::new();
        let sink = speaker.open_output(PcmFormat::mono(RATE)).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        (PlaybackScheduler::new(sink, tx), speaker, rx)
    }

    fn chunk(frames: usize) -> AudioChunk {
        AudioChunk {
            data: encode_base64(&quantize_pcm16(&vec![0.25; frames])),
            format: PcmFormat::mono(RATE),
        }
    }

    #[test]
    fn buffers_are_scheduled_back_to_back() {
        let (mut scheduler, _speaker, _rx) = scheduler();
        let durations = [2_400usize, 12_000, 480, 7_200];
        let handles: Vec<PlaybackHandle> = durations
            .iter()
            .map(|frames| scheduler.enqueue(&chunk(*frames)).unwrap())
            .collect();

        for pair in handles.windows(2) {
            assert!(pair[1].start_at >= pair[0].start_at + pair[0].duration);
        }
        assert_eq!(handles[0].start_at, 0.0);
        assert_eq!(scheduler.active_count(), 4);
    }

    #[test]
    fn late_buffer_starts_at_current_time() {
        let (mut scheduler, speaker, _rx) = scheduler();
        scheduler.enqueue(&chunk(2_400)).unwrap();
        speaker.advance_to(5.0);

        let handle = scheduler.enqueue(&chunk(2_400)).unwrap();
        assert_eq!(handle.start_at, 5.0);
        assert!((scheduler.cursor() - 5.1).abs() < 1e-9);
    }

    #[test]
    fn natural_completion_reports_buffer_id() {
        let (mut scheduler, speaker, mut rx) = scheduler();
        let first = scheduler.enqueue(&chunk(2_400)).unwrap();
        let second = scheduler.enqueue(&chunk(2_400)).unwrap();

        speaker.advance_to(0.15);
        assert_eq!(rx.try_recv().unwrap(), first.id);
        assert!(rx.try_recv().is_err());

        assert!(scheduler.finished(first.id));
        assert!(!scheduler.finished(first.id));
        assert!(scheduler.is_active(second.id));
        assert_eq!(scheduler.active_count(), 1);
    }

    #[test]
    fn interrupt_stops_everything_and_resets_cursor() {
        let (mut scheduler, speaker, _rx) = scheduler();
        for _ in 0..3 {
            scheduler.enqueue(&chunk(24_000)).unwrap();
        }
        speaker.advance_to(0.5);
        assert!((scheduler.cursor() - 3.0).abs() < 1e-9);

        assert_eq!(scheduler.interrupt(), 3);
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(speaker.playing(), 0);
        assert_eq!(speaker.stopped().len(), 3);

        speaker.advance_to(0.75);
        let next = scheduler.enqueue(&chunk(2_400)).unwrap();
        assert_eq!(next.start_at, 0.75);
    }

    #[test]
    fn malformed_chunk_is_rejected_without_scheduling() {
        let (mut scheduler, speaker, _rx) = scheduler();
        let bad = AudioChunk {
            data: "%%%".to_string(),
            format: PcmFormat::mono(RATE),
        };
        assert!(matches!(scheduler.enqueue(&bad), Err(LiveError::Decode(_))));

        let empty = AudioChunk {
            data: String::new(),
            format: PcmFormat::mono(RATE),
        };
        assert!(matches!(
            scheduler.enqueue(&empty),
            Err(LiveError::Decode(_))
        ));
        assert!(speaker.started().is_empty());
        assert_eq!(scheduler.cursor(), 0.0);
    }

    #[test]
    fn zero_rate_chunk_is_rejected_and_cursor_holds() {
        let (mut scheduler, speaker, _rx) = scheduler();
        scheduler.enqueue(&chunk(2_400)).unwrap();
        let silent_rate = AudioChunk {
            data: encode_base64(&quantize_pcm16(&[0.25; 2_400])),
            format: PcmFormat::new(0, 1),
        };

        assert!(matches!(
            scheduler.enqueue(&silent_rate),
            Err(LiveError::Decode(_))
        ));
        assert_eq!(speaker.started().len(), 1);
        assert!((scheduler.cursor() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn stereo_chunk_duration_uses_frames_per_channel() {
        let buffer = PlaybackScheduler::decode(&AudioChunk {
            data: encode_base64(&quantize_pcm16(&[0.1; 4_800])),
            format: PcmFormat::new(RATE, 2),
        })
        .unwrap();
        assert_eq!(buffer.channels.len(), 2);
        assert_eq!(buffer.frame_count(), 2_400);
        assert!((buffer.duration() - 0.1).abs() < 1e-9);
    }
}
