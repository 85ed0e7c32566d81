//! Audio capabilities: capture encoding, codec, and playback scheduling.

pub mod capture;
pub mod codec;
pub mod output;
pub mod playback;
pub mod types;

pub use capture::{CaptureEncoder, CaptureRequest, Microphone, MicrophoneStream};
pub use output::{OutputSink, Speaker, StartedBuffer, VirtualSink, VirtualSpeaker};
pub use playback::{CompletionHook, PlaybackHandle, PlaybackScheduler};
pub use types::*;
