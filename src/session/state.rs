//! Observable lifecycle state of a live session.

use strum::Display;

use crate::transcript::TurnTranscript;

/// Lifecycle state of a [`LiveSession`](super::LiveSession).
///
/// `Idle -> Connecting -> Active -> Closing -> Idle` on the success path,
/// `Connecting | Active -> Error -> Idle` when the channel fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    /// No channel, no microphone, no playback.
    #[default]
    Idle,
    /// Microphone granted; waiting for the channel to open.
    Connecting,
    /// Streaming in both directions.
    Active,
    /// Teardown issued.
    Closing,
    /// The channel failed; teardown follows immediately.
    Error,
}

impl SessionState {
    /// Whether a session exists in this state.
    pub fn is_open(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Point-in-time view of a live session for observers.
///
/// Subscribe with [`LiveSession::subscribe`](super::LiveSession::subscribe).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub pending_input: String,
    pub pending_output: String,
    pub turns: Vec<TurnTranscript>,
    pub last_error: Option<String>,
}
