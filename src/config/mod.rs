//! Configuration system (layered: code > env > config file).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use crate::audio::types::PcmFormat;
use crate::error::LiveError;
use crate::gateway::LiveSetup;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";
pub const DEFAULT_VOICE: &str = "Zephyr";
pub const DEFAULT_BASE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// API key variables, lowest precedence first.
const API_KEY_VARS: [&str; 3] = ["API_KEY", "GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// Settings for live voice sessions.
///
/// Resolution order:
/// 1. Values set in code (builder or field assignment)
/// 2. Environment variables (`merge_env`)
/// 3. A TOML file (`load`)
#[derive(Clone, Builder)]
pub struct LiveConfig {
    pub api_key: Option<String>,
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    pub base_url: String,
    #[builder(into, default = DEFAULT_MODEL.to_string())]
    pub model: String,
    #[builder(into, default = DEFAULT_VOICE.to_string())]
    pub voice: String,
    pub system_instruction: Option<String>,
    /// Microphone capture rate in Hz.
    #[builder(default = 16_000)]
    pub input_sample_rate: u32,
    /// Rate of audio received from the provider in Hz.
    #[builder(default = 24_000)]
    pub output_sample_rate: u32,
    #[builder(default = 1)]
    pub output_channels: u16,
    /// Samples per captured frame.
    #[builder(default = 4096)]
    pub frame_size: usize,
    #[builder(default = Duration::from_secs(20))]
    pub heartbeat_interval: Duration,
    pub state_dir: Option<PathBuf>,
}

impl fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("system_instruction", &self.system_instruction)
            .field("input_sample_rate", &self.input_sample_rate)
            .field("output_sample_rate", &self.output_sample_rate)
            .field("output_channels", &self.output_channels)
            .field("frame_size", &self.frame_size)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("state_dir", &self.state_dir)
            .finish()
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// On-disk shape; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    voice: Option<String>,
    system_instruction: Option<String>,
    input_sample_rate: Option<u32>,
    output_sample_rate: Option<u32>,
    output_channels: Option<u16>,
    frame_size: Option<usize>,
    heartbeat_interval_secs: Option<u64>,
    state_dir: Option<PathBuf>,
}

impl LiveConfig {
    /// Defaults overlaid with the environment (and `.env` if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        config.merge_env();
        config
    }

    /// Parse a TOML config document over the defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, LiveError> {
        let file: ConfigFile = toml::from_str(raw)
            .map_err(|error| LiveError::Configuration(format!("Invalid config file: {error}")))?;
        let mut config = Self::default();
        config.apply_file(file);
        Ok(config)
    }

    /// Read a TOML file, then overlay the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LiveError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml_str(&raw)?;
        config.merge_env();
        Ok(config)
    }

    /// Overlay environment variables onto this config.
    pub fn merge_env(&mut self) {
        for var in API_KEY_VARS {
            if let Some(key) = env_value(var) {
                self.api_key = Some(key);
            }
        }
        if let Some(model) = env_value("DEEPBERG_LIVE_MODEL") {
            self.model = model;
        }
        if let Some(voice) = env_value("DEEPBERG_LIVE_VOICE") {
            self.voice = voice;
        }
        if let Some(url) = env_value("DEEPBERG_LIVE_BASE_URL") {
            self.base_url = url;
        }
        if let Some(dir) = env_value("DEEPBERG_STATE_DIR") {
            self.state_dir = Some(PathBuf::from(dir));
        }
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if file.api_key.is_some() {
            self.api_key = file.api_key;
        }
        if let Some(url) = file.base_url {
            self.base_url = url;
        }
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(voice) = file.voice {
            self.voice = voice;
        }
        if file.system_instruction.is_some() {
            self.system_instruction = file.system_instruction;
        }
        if let Some(rate) = file.input_sample_rate {
            self.input_sample_rate = rate;
        }
        if let Some(rate) = file.output_sample_rate {
            self.output_sample_rate = rate;
        }
        if let Some(channels) = file.output_channels {
            self.output_channels = channels;
        }
        if let Some(size) = file.frame_size {
            self.frame_size = size;
        }
        if let Some(secs) = file.heartbeat_interval_secs {
            self.heartbeat_interval = Duration::from_secs(secs);
        }
        if file.state_dir.is_some() {
            self.state_dir = file.state_dir;
        }
    }

    /// Reject settings a session cannot run with, including a missing API key.
    pub fn validate(&self) -> Result<(), LiveError> {
        if self
            .api_key
            .as_deref()
            .map_or(true, |key| key.trim().is_empty())
        {
            return Err(LiveError::Authentication("Missing GEMINI_API_KEY".into()));
        }
        if self.model.trim().is_empty() {
            return Err(LiveError::Configuration("Model cannot be empty".into()));
        }
        self.validate_audio()
    }

    /// Reject capture and playback settings that cannot produce audio.
    ///
    /// Checked by every session open, whatever gateway is in use.
    pub fn validate_audio(&self) -> Result<(), LiveError> {
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(LiveError::Configuration(
                "Sample rates must be greater than zero".into(),
            ));
        }
        if self.output_channels == 0 {
            return Err(LiveError::Configuration(
                "Output channel count must be at least 1".into(),
            ));
        }
        if self.frame_size == 0 {
            return Err(LiveError::Configuration(
                "Frame size must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn input_format(&self) -> PcmFormat {
        PcmFormat::mono(self.input_sample_rate)
    }

    pub fn output_format(&self) -> PcmFormat {
        PcmFormat::new(self.output_sample_rate, self.output_channels)
    }

    /// Session parameters sent to the provider.
    pub fn setup(&self) -> LiveSetup {
        LiveSetup {
            model: self.model.clone(),
            voice: self.voice.clone(),
            system_instruction: self.system_instruction.clone(),
            input_format: self.input_format(),
            output_format: self.output_format(),
        }
    }

    /// Directory for persisted user state (`~/.deepberg` unless overridden).
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }
}

pub(crate) fn default_state_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".deepberg"))
        .unwrap_or_else(|| PathBuf::from(".deepberg"))
}

fn env_value(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
