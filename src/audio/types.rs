//! Audio-related types.

use serde::{Deserialize, Serialize};

/// Linear PCM stream layout: sample rate and interleaved channel count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub const fn mono(sample_rate: u32) -> Self {
        Self::new(sample_rate, 1)
    }

    /// MIME-like tag describing 16-bit PCM at this rate, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        if self.channels == 1 {
            format!("audio/pcm;rate={}", self.sample_rate)
        } else {
            format!(
                "audio/pcm;rate={};channels={}",
                self.sample_rate, self.channels
            )
        }
    }

    /// Read `rate=` and `channels=` parameters from a MIME tag.
    ///
    /// Parameters that are missing or unparsable fall back to `fallback`.
    pub fn from_mime_type(mime_type: &str, fallback: PcmFormat) -> Self {
        let mut format = fallback;
        for param in mime_type.split(';').skip(1) {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "rate" => {
                    if let Ok(rate) = value.trim().parse::<u32>() {
                        if rate > 0 {
                            format.sample_rate = rate;
                        }
                    }
                }
                "channels" => {
                    if let Ok(channels) = value.trim().parse::<u16>() {
                        if channels > 0 {
                            format.channels = channels;
                        }
                    }
                }
                _ => {}
            }
        }
        format
    }
}

/// One captured block of 16-bit PCM, transport-encoded and tagged with its format.
///
/// Frames are immutable once captured; sending one hands it to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    mime_type: String,
    data: String,
    sample_count: usize,
}

impl AudioFrame {
    pub(crate) fn new(mime_type: String, data: String, sample_count: usize) -> Self {
        Self {
            mime_type,
            data,
            sample_count,
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Base64 text of the little-endian sample bytes.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}

/// Transport-encoded audio received from the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub data: String,
    pub format: PcmFormat,
}

/// Decoded, playable audio: one sample vector per channel, values in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    pub format: PcmFormat,
    pub channels: Vec<Vec<f32>>,
}

impl PlaybackBuffer {
    pub fn frame_count(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / f64::from(self.format.sample_rate)
    }
}

/// Identifies one scheduled playback buffer within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u64);

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "buffer-{}", self.0)
    }
}
