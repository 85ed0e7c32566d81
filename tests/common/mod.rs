//! Shared test doubles: a scripted gateway and a fake microphone.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use deepberg_live::audio::codec::{encode_base64, quantize_pcm16};
use deepberg_live::audio::{AudioChunk, CaptureRequest, Microphone, MicrophoneStream, PcmFormat};
use deepberg_live::error::LiveError;
use deepberg_live::gateway::{
    ChannelEndpoint, GatewayEvent, GatewayEventSender, LiveChannel, LiveGateway, LiveSetup,
    ServerMessage,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct GatewayState {
    setups: Vec<LiveSetup>,
    events: Option<GatewayEventSender>,
    endpoint: Option<ChannelEndpoint>,
}

/// Gateway whose events are pushed by the test.
#[derive(Default)]
pub struct ScriptedGateway {
    state: Mutex<GatewayState>,
    refuse: Option<String>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A gateway that fails every connect with an authentication error.
    pub fn refusing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            refuse: Some(reason.to_string()),
            ..Self::default()
        })
    }

    pub fn connects(&self) -> usize {
        lock(&self.state).setups.len()
    }

    pub fn last_setup(&self) -> Option<LiveSetup> {
        lock(&self.state).setups.last().cloned()
    }

    /// Push an event to the connected session.
    pub fn emit(&self, event: GatewayEvent) {
        let state = lock(&self.state);
        let events = state.events.as_ref().expect("gateway should be connected");
        events.send(event).expect("session should be listening");
    }

    pub fn emit_message(&self, message: ServerMessage) {
        self.emit(GatewayEvent::Message(message));
    }

    /// Drop the event sender without a terminal event.
    pub fn drop_events(&self) {
        lock(&self.state).events = None;
    }

    /// Take the gateway side of the most recent channel.
    pub fn take_endpoint(&self) -> ChannelEndpoint {
        lock(&self.state)
            .endpoint
            .take()
            .expect("gateway should be connected")
    }
}

#[async_trait]
impl LiveGateway for ScriptedGateway {
    async fn connect(
        &self,
        setup: &LiveSetup,
        events: GatewayEventSender,
    ) -> Result<LiveChannel, LiveError> {
        let mut state = lock(&self.state);
        state.setups.push(setup.clone());
        if let Some(reason) = &self.refuse {
            return Err(LiveError::Authentication(reason.clone()));
        }
        let (channel, endpoint) = LiveChannel::new();
        state.events = Some(events);
        state.endpoint = Some(endpoint);
        Ok(channel)
    }
}

#[derive(Default)]
struct MicrophoneState {
    requests: Vec<CaptureRequest>,
    blocks: Option<mpsc::UnboundedSender<Vec<f32>>>,
    stopped: Vec<Arc<AtomicBool>>,
}

/// Microphone that hands out test-fed block streams.
#[derive(Default)]
pub struct FakeMicrophone {
    state: Mutex<MicrophoneState>,
    deny: bool,
}

impl FakeMicrophone {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denying() -> Arc<Self> {
        Arc::new(Self {
            deny: true,
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<CaptureRequest> {
        lock(&self.state).requests.clone()
    }

    /// Feed a block into the most recently opened stream.
    pub fn capture(&self, block: Vec<f32>) {
        let state = lock(&self.state);
        let blocks = state.blocks.as_ref().expect("microphone should be open");
        let _ = blocks.send(block);
    }

    /// Whether the most recently opened stream has been stopped.
    pub fn stream_stopped(&self) -> bool {
        lock(&self.state)
            .stopped
            .last()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Microphone for FakeMicrophone {
    async fn request_access(
        &self,
        request: CaptureRequest,
    ) -> Result<Box<dyn MicrophoneStream>, LiveError> {
        let mut state = lock(&self.state);
        state.requests.push(request);
        if self.deny {
            return Err(LiveError::PermissionDenied("user dismissed the prompt".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let stopped = Arc::new(AtomicBool::new(false));
        state.blocks = Some(tx);
        state.stopped.push(Arc::clone(&stopped));
        Ok(Box::new(FakeStream {
            blocks: Some(rx),
            stopped,
        }))
    }
}

struct FakeStream {
    blocks: Option<mpsc::UnboundedReceiver<Vec<f32>>>,
    stopped: Arc<AtomicBool>,
}

impl MicrophoneStream for FakeStream {
    fn take_blocks(&mut self) -> Option<mpsc::UnboundedReceiver<Vec<f32>>> {
        self.blocks.take()
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Audio message holding `frames` mono samples at 24 kHz.
pub fn audio_message(frames: usize) -> ServerMessage {
    ServerMessage::AudioPayload(AudioChunk {
        data: encode_base64(&quantize_pcm16(&vec![0.25; frames])),
        format: PcmFormat::mono(24_000),
    })
}
