//! Streaming voice gateway contract.
//!
//! A [`LiveGateway`] opens one bidirectional channel per session. Its
//! callbacks are delivered as [`GatewayEvent`]s on an mpsc channel: `Opened`
//! once, any number of `Message`s, then exactly one terminal `Closed` or
//! `Error`.

pub mod message;

#[cfg(feature = "gemini")]
pub mod gemini;

pub use message::ServerMessage;

#[cfg(feature = "gemini")]
pub use gemini::GeminiLiveGateway;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::audio::types::{AudioFrame, PcmFormat};
use crate::error::LiveError;

/// Event pushed by a gateway into the owning session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Opened,
    Message(ServerMessage),
    Error(String),
    Closed,
}

/// Sender half handed to [`LiveGateway::connect`].
pub type GatewayEventSender = mpsc::UnboundedSender<GatewayEvent>;

/// Session parameters sent to the provider when the channel opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSetup {
    pub model: String,
    pub voice: String,
    pub system_instruction: Option<String>,
    pub input_format: PcmFormat,
    pub output_format: PcmFormat,
}

/// Provider endpoint offering bidirectional voice sessions.
#[async_trait]
pub trait LiveGateway: Send + Sync {
    /// Establish a streaming channel and start delivering events to `events`.
    async fn connect(
        &self,
        setup: &LiveSetup,
        events: GatewayEventSender,
    ) -> Result<LiveChannel, LiveError>;
}

/// Client handle to an open streaming channel.
///
/// Cheap to clone. Sends are fire-and-forget and keep their order.
#[derive(Debug, Clone)]
pub struct LiveChannel {
    input_tx: mpsc::UnboundedSender<AudioFrame>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

/// Gateway-side half of a [`LiveChannel`].
#[derive(Debug)]
pub struct ChannelEndpoint {
    pub input_rx: mpsc::UnboundedReceiver<AudioFrame>,
    pub shutdown_rx: watch::Receiver<bool>,
}

impl LiveChannel {
    /// Create a channel handle and the endpoint a gateway drains.
    pub fn new() -> (Self, ChannelEndpoint) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            Self {
                input_tx,
                shutdown_tx: Arc::new(shutdown_tx),
            },
            ChannelEndpoint {
                input_rx,
                shutdown_rx,
            },
        )
    }

    /// Queue one frame of realtime input.
    pub fn send_realtime_input(&self, frame: AudioFrame) -> Result<(), LiveError> {
        if self.is_closed() {
            return Err(LiveError::Channel("Live channel is closed".into()));
        }
        self.input_tx
            .send(frame)
            .map_err(|_| LiveError::Channel("Live channel endpoint dropped".into()))
    }

    /// Request teardown. Repeated calls are no-ops.
    pub fn close(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}
