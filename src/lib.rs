//! Deepberg Live: real-time voice session core
//!
//! Drives one bidirectional voice conversation with a streaming provider:
//! microphone frames are encoded and streamed out, received audio is decoded
//! and scheduled for gapless playback, and partial transcripts are folded into
//! finalized turns.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use deepberg_live::prelude::*;
//!
//! # async fn example(microphone: Arc<dyn Microphone>) -> deepberg_live::error::Result<()> {
//! let config = LiveConfig::from_env();
//! let gateway = Arc::new(GeminiLiveGateway::from_config(&config)?);
//! let speaker = Arc::new(VirtualSpeaker::new());
//!
//! let mut live = LiveSession::new(config, gateway, microphone, speaker);
//! live.open().await?;
//! live.run().await;
//! if let Some(record) = live.transcript().to_history_record() {
//!     println!("{}", record.result);
//! }
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod gateway;
pub mod prelude;
pub mod session;
pub mod store;
pub mod transcript;
