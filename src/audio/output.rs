//! Output device seam and a headless virtual implementation.

use std::sync::{Arc, Mutex, MutexGuard};

use super::playback::CompletionHook;
use super::types::{BufferId, PcmFormat, PlaybackBuffer};
use crate::error::LiveError;

/// One session's audio output, with its own clock in seconds.
pub trait OutputSink: Send {
    /// Current time on the output clock.
    fn current_time(&self) -> f64;

    /// Begin playing `buffer` at `start_at` on the output clock.
    ///
    /// The sink calls [`CompletionHook::notify`] when playback ends naturally.
    fn start(&mut self, buffer: PlaybackBuffer, start_at: f64, on_ended: CompletionHook);

    /// Force-stop a buffer. Unknown or already finished ids are ignored.
    fn stop(&mut self, id: BufferId);
}

/// Host audio output that can open a sink per session.
pub trait Speaker: Send + Sync {
    fn open_output(&self, format: PcmFormat) -> Result<Box<dyn OutputSink>, LiveError>;
}

/// Record of a buffer handed to a [`VirtualSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct StartedBuffer {
    pub id: BufferId,
    pub start_at: f64,
    pub duration: f64,
}

struct Voice {
    id: BufferId,
    end_at: f64,
    hook: CompletionHook,
}

#[derive(Default)]
struct VirtualState {
    now: f64,
    playing: Vec<Voice>,
    started: Vec<StartedBuffer>,
    stopped: Vec<BufferId>,
    opened: usize,
}

/// Headless speaker with a manually advanced clock.
///
/// Keeps a record of every started and stopped buffer for inspection until
/// [`VirtualSpeaker::clear_history`] is called.
///
/// Every sink opened from one `VirtualSpeaker` shares its clock and history,
/// so a caller holding a clone can drive playback and inspect it.
#[derive(Clone, Default)]
pub struct VirtualSpeaker {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VirtualState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn now(&self) -> f64 {
        self.lock().now
    }

    /// Move the clock forward, firing completion hooks for buffers that ended.
    ///
    /// The clock never moves backward; earlier times are ignored.
    pub fn advance_to(&self, time: f64) {
        let finished = {
            let mut state = self.lock();
            if time > state.now {
                state.now = time;
            }
            let now = state.now;
            let (done, still_playing): (Vec<Voice>, Vec<Voice>) =
                state.playing.drain(..).partition(|voice| voice.end_at <= now);
            state.playing = still_playing;
            done
        };
        for voice in finished {
            voice.hook.notify();
        }
    }

    /// Buffers started so far, in start-call order.
    pub fn started(&self) -> Vec<StartedBuffer> {
        self.lock().started.clone()
    }

    /// Buffers force-stopped so far.
    pub fn stopped(&self) -> Vec<BufferId> {
        self.lock().stopped.clone()
    }

    /// Buffers started and not yet finished or stopped.
    pub fn playing(&self) -> usize {
        self.lock().playing.len()
    }

    /// Number of sinks opened.
    pub fn outputs_opened(&self) -> usize {
        self.lock().opened
    }

    /// Forget the started and stopped records. Playing buffers are untouched.
    ///
    /// Both records grow with every buffer; long-running hosts call this
    /// periodically.
    pub fn clear_history(&self) {
        let mut state = self.lock();
        state.started.clear();
        state.stopped.clear();
    }
}

impl Speaker for VirtualSpeaker {
    fn open_output(&self, _format: PcmFormat) -> Result<Box<dyn OutputSink>, LiveError> {
        self.lock().opened += 1;
        Ok(Box::new(VirtualSink {
            speaker: self.clone(),
        }))
    }
}

/// Sink half of a [`VirtualSpeaker`].
pub struct VirtualSink {
    speaker: VirtualSpeaker,
}

impl OutputSink for VirtualSink {
    fn current_time(&self) -> f64 {
        self.speaker.now()
    }

    fn start(&mut self, buffer: PlaybackBuffer, start_at: f64, on_ended: CompletionHook) {
        let duration = buffer.duration();
        let id = on_ended.id();
        let mut state = self.speaker.lock();
        state.started.push(StartedBuffer {
            id,
            start_at,
            duration,
        });
        state.playing.push(Voice {
            id,
            end_at: start_at + duration,
            hook: on_ended,
        });
    }

    fn stop(&mut self, id: BufferId) {
        let mut state = self.speaker.lock();
        let before = state.playing.len();
        state.playing.retain(|voice| voice.id != id);
        if state.playing.len() != before {
            state.stopped.push(id);
        }
    }
}
