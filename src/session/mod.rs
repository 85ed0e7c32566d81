//! Live voice session state machine.
//!
//! A [`LiveSession`] owns at most one open session at a time: the gateway
//! channel, the microphone stream and its capture task, and the playback
//! scheduler. Inputs (gateway events and playback completions) arrive on
//! channels and are handled one at a time by [`LiveSession::pump`], so every
//! handler runs to completion before the next input is looked at.
//!
//! # Example
//!
//! ```ignore
//! let mut live = LiveSession::new(config, gateway, microphone, speaker);
//! live.open().await?;
//! while live.pump().await {
//!     println!("{}", live.snapshot().pending_output);
//! }
//! ```

pub mod state;

pub use state::{SessionSnapshot, SessionState};

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::capture::CapturePipeline;
use crate::audio::{
    BufferId, CaptureEncoder, CaptureRequest, Microphone, MicrophoneStream, PlaybackHandle,
    PlaybackScheduler, Speaker,
};
use crate::config::LiveConfig;
use crate::error::LiveError;
use crate::gateway::{GatewayEvent, LiveChannel, LiveGateway, ServerMessage};
use crate::transcript::TranscriptAggregator;

/// Resources of one open session, released together.
struct Session {
    id: Uuid,
    channel: Option<LiveChannel>,
    microphone: Box<dyn MicrophoneStream>,
    capture: Option<CapturePipeline>,
    playback: PlaybackScheduler,
    events_rx: mpsc::UnboundedReceiver<GatewayEvent>,
    completions_rx: mpsc::UnboundedReceiver<BufferId>,
}

impl Session {
    /// Issue every teardown request without waiting on any of them.
    ///
    /// Returns the number of playback buffers force-stopped.
    fn release(mut self) -> usize {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        if let Some(capture) = self.capture.take() {
            capture.stop();
        }
        self.microphone.stop();
        self.playback.stop_all()
    }
}

enum Input {
    Event(GatewayEvent),
    PlaybackFinished(BufferId),
}

/// Lifecycle owner for real-time voice sessions.
///
/// Finalized transcript turns outlive individual sessions; pending partial
/// text is dropped whenever a session ends.
pub struct LiveSession {
    config: LiveConfig,
    gateway: Arc<dyn LiveGateway>,
    microphone: Arc<dyn Microphone>,
    speaker: Arc<dyn Speaker>,
    state: SessionState,
    session: Option<Session>,
    transcript: TranscriptAggregator,
    last_error: Option<String>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl LiveSession {
    pub fn new(
        config: LiveConfig,
        gateway: Arc<dyn LiveGateway>,
        microphone: Arc<dyn Microphone>,
        speaker: Arc<dyn Speaker>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            config,
            gateway,
            microphone,
            speaker,
            state: SessionState::Idle,
            session: None,
            transcript: TranscriptAggregator::new(),
            last_error: None,
            snapshot_tx,
        }
    }

    /// Open a session: request the microphone, then connect the gateway.
    ///
    /// A no-op unless the machine is `Idle`. On success the state is
    /// `Connecting`; it becomes `Active` when the gateway reports `Opened`.
    ///
    /// # Errors
    ///
    /// - [`LiveError::Configuration`] for zero sample rates, channels or
    ///   frame size. Nothing is opened.
    /// - [`LiveError::PermissionDenied`] if microphone access is refused. The
    ///   state stays `Idle`.
    /// - Any error from opening the output or connecting the gateway. The
    ///   session is torn down and the state returns to `Idle`.
    pub async fn open(&mut self) -> Result<(), LiveError> {
        if self.state != SessionState::Idle {
            debug!(state = %self.state, "open ignored: session already in progress");
            return Ok(());
        }
        if let Err(error) = self.config.validate_audio() {
            warn!(error = %error, "refusing to open with unusable audio settings");
            self.record_error(&error);
            return Err(error);
        }

        let request = CaptureRequest {
            sample_rate: self.config.input_sample_rate,
            frame_size: self.config.frame_size,
        };
        let mut microphone = match self.microphone.request_access(request).await {
            Ok(stream) => stream,
            Err(error) => {
                warn!(error = %error, "microphone access failed");
                self.record_error(&error);
                return Err(error);
            }
        };

        let sink = match self.speaker.open_output(self.config.output_format()) {
            Ok(sink) => sink,
            Err(error) => {
                microphone.stop();
                warn!(error = %error, "audio output unavailable");
                self.record_error(&error);
                return Err(error);
            }
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.session = Some(Session {
            id,
            channel: None,
            microphone,
            capture: None,
            playback: PlaybackScheduler::new(sink, completions_tx),
            events_rx,
            completions_rx,
        });
        self.last_error = None;
        self.transition(SessionState::Connecting);

        let setup = self.config.setup();
        match self.gateway.connect(&setup, events_tx).await {
            Ok(channel) => {
                if let Some(session) = self.session.as_mut() {
                    session.channel = Some(channel);
                }
                info!(session_id = %id, model = %setup.model, "live session connecting");
                Ok(())
            }
            Err(error) => {
                self.fail(&error);
                Err(error)
            }
        }
    }

    /// Tear down the open session, if any, and return to `Idle`.
    ///
    /// Idempotent. Nothing is awaited: the channel, microphone and playback
    /// are asked to stop and the session is closed as soon as that is issued.
    pub fn close(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.transition(SessionState::Closing);
        self.teardown();
    }

    /// Wait for the next input and handle it.
    ///
    /// Returns `false` once no session is open. A gateway that drops its
    /// event sender without a terminal event is treated as closed.
    pub async fn pump(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let input = tokio::select! {
            biased;
            event = session.events_rx.recv() => {
                Input::Event(event.unwrap_or(GatewayEvent::Closed))
            }
            Some(id) = session.completions_rx.recv() => Input::PlaybackFinished(id),
        };
        match input {
            Input::Event(event) => self.handle_gateway_event(event),
            Input::PlaybackFinished(id) => self.handle_playback_finished(id),
        }
        self.session.is_some()
    }

    /// Pump until the session ends.
    pub async fn run(&mut self) {
        while self.pump().await {}
    }

    /// Handle one gateway callback.
    pub fn handle_gateway_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Opened => self.on_opened(),
            GatewayEvent::Message(message) => self.on_message(message),
            GatewayEvent::Error(cause) => self.report(LiveError::Channel(cause)),
            GatewayEvent::Closed => self.close(),
        }
    }

    /// Drop a naturally finished buffer from the active set.
    pub fn handle_playback_finished(&mut self, id: BufferId) {
        if let Some(session) = self.session.as_mut() {
            if session.playback.finished(id) {
                debug!(buffer = %id, "playback finished");
            }
        }
    }

    fn on_opened(&mut self) {
        if self.state != SessionState::Connecting {
            debug!(state = %self.state, "ignoring channel open notification");
            return;
        }
        let encoder = CaptureEncoder::new(self.config.input_sample_rate);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match (session.microphone.take_blocks(), session.channel.clone()) {
            (Some(blocks), Some(channel)) => {
                session.capture = Some(CapturePipeline::spawn(blocks, encoder, channel));
            }
            _ => warn!(session_id = %session.id, "capture not started: no microphone blocks or channel"),
        }
        info!(session_id = %session.id, "live session active");
        self.transition(SessionState::Active);
    }

    fn on_message(&mut self, message: ServerMessage) {
        let Some(session) = self.session.as_mut() else {
            debug!("dropping message outside a session");
            return;
        };
        match message {
            ServerMessage::AudioPayload(chunk) => match session.playback.enqueue(&chunk) {
                Ok(handle) => debug!(
                    buffer = %handle.id,
                    start_at = handle.start_at,
                    duration = handle.duration,
                    "scheduled playback"
                ),
                Err(error) => return self.report(error),
            },
            ServerMessage::PartialInputText(text) => self.transcript.append_input(&text),
            ServerMessage::PartialOutputText(text) => self.transcript.append_output(&text),
            ServerMessage::TurnComplete => {
                self.transcript.finalize_turn();
                debug!(turns = self.transcript.turns().len(), "turn complete");
            }
            ServerMessage::Interrupted => {
                let stopped = session.playback.interrupt();
                debug!(stopped, "playback interrupted");
            }
            ServerMessage::Unknown { kind } => debug!(kind = %kind, "ignoring server message"),
        }
        self.publish();
    }

    /// Tear down for session-fatal errors; log and drop everything else.
    fn report(&mut self, error: LiveError) {
        if !error.is_session_fatal() {
            warn!(error = %error, "dropping message after contained error");
            return;
        }
        if self.session.is_some() {
            self.fail(&error);
        } else {
            debug!(error = %error, "ignoring gateway error outside a session");
        }
    }

    fn fail(&mut self, error: &LiveError) {
        warn!(error = %error, state = %self.state, "live session failed");
        self.last_error = Some(error.to_string());
        self.transition(SessionState::Error);
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            let session_id = session.id;
            let stopped = session.release();
            info!(session_id = %session_id, stopped_buffers = stopped, "live session closed");
        }
        self.transcript.discard_pending();
        self.transition(SessionState::Idle);
    }

    fn record_error(&mut self, error: &LiveError) {
        self.last_error = Some(error.to_string());
        self.publish();
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "session state change");
            self.state = next;
        }
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of the open session, if any.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|session| session.id)
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn transcript(&self) -> &TranscriptAggregator {
        &self.transcript
    }

    /// Buffers scheduled and not yet finished or stopped.
    pub fn active_buffers(&self) -> Vec<PlaybackHandle> {
        self.session
            .as_ref()
            .map(|session| session.playback.active().copied().collect())
            .unwrap_or_default()
    }

    /// Next playback start time, while a session is open.
    pub fn cursor(&self) -> Option<f64> {
        self.session
            .as_ref()
            .map(|session| session.playback.cursor())
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            pending_input: self.transcript.pending().input.clone(),
            pending_output: self.transcript.pending().output.clone(),
            turns: self.transcript.turns().to_vec(),
            last_error: self.last_error.clone(),
        }
    }

    /// Subscribe to snapshot changes via a [`watch::Receiver`].
    ///
    /// A new snapshot is published after every handled input.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.release();
        }
    }
}
