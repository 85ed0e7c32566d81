//! Convenience re-exports for common use.

pub use crate::audio::{
    AudioChunk, AudioFrame, CaptureEncoder, Microphone, MicrophoneStream, OutputSink, PcmFormat,
    PlaybackScheduler, Speaker, VirtualSpeaker,
};
pub use crate::config::LiveConfig;
pub use crate::error::{LiveError, Result};
pub use crate::gateway::{GatewayEvent, LiveChannel, LiveGateway, LiveSetup, ServerMessage};
pub use crate::session::{LiveSession, SessionSnapshot, SessionState};
pub use crate::store::{FileStateStore, GenerationRecord, StateStore, UserState};
pub use crate::transcript::{TranscriptAggregator, TurnTranscript};

#[cfg(feature = "gemini")]
pub use crate::gateway::GeminiLiveGateway;
