//! Gemini Live gateway over WebSocket.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Map, Value};
use tokio::{
    net::TcpStream,
    time::{self, MissedTickBehavior},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Error as WsError, Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use super::{
    ChannelEndpoint, GatewayEvent, GatewayEventSender, LiveChannel, LiveGateway, LiveSetup,
    ServerMessage,
};
use crate::audio::types::{AudioFrame, PcmFormat};
use crate::config::{LiveConfig, DEFAULT_BASE_URL};
use crate::error::LiveError;

const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

type LiveWebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Gemini bidirectional Live API client.
#[derive(Clone)]
pub struct GeminiLiveGateway {
    api_key: String,
    base_url: String,
    heartbeat_interval: Duration,
}

impl fmt::Debug for GeminiLiveGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiLiveGateway")
            .field("api_key", &"..")
            .field("base_url", &self.base_url)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish()
    }
}

impl GeminiLiveGateway {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            heartbeat_interval: Duration::from_secs(20),
        }
    }

    /// Build from config; fails when no API key is configured.
    pub fn from_config(config: &LiveConfig) -> Result<Self, LiveError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LiveError::Authentication("Missing GEMINI_API_KEY".into()))?;
        Ok(Self {
            api_key,
            base_url: config.base_url.clone(),
            heartbeat_interval: config.heartbeat_interval,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

#[async_trait]
impl LiveGateway for GeminiLiveGateway {
    async fn connect(
        &self,
        setup: &LiveSetup,
        events: GatewayEventSender,
    ) -> Result<LiveChannel, LiveError> {
        if self.api_key.trim().is_empty() {
            return Err(LiveError::Authentication("Missing GEMINI_API_KEY".into()));
        }
        let url = build_live_url(&self.base_url, &self.api_key)?;
        let bootstrap = build_setup_payload(setup)?;

        let mut socket = connect_live_socket(&url).await?;
        socket
            .send(Message::Text(bootstrap.into()))
            .await
            .map_err(|error| LiveError::Stream(format!("Live setup send failed: {error}")))?;
        info!(model = %setup.model, voice = %setup.voice, "live websocket connected");

        let (channel, endpoint) = LiveChannel::new();
        let params = ConnectionParams {
            heartbeat_interval: self.heartbeat_interval.max(MIN_HEARTBEAT),
            output_format: setup.output_format,
        };
        tokio::spawn(run_connection(socket, endpoint, events, params));
        Ok(channel)
    }
}

#[derive(Clone, Copy)]
struct ConnectionParams {
    heartbeat_interval: Duration,
    output_format: PcmFormat,
}

async fn run_connection(
    mut socket: LiveWebSocket,
    mut endpoint: ChannelEndpoint,
    events: GatewayEventSender,
    params: ConnectionParams,
) {
    let terminal = drive_connection(&mut socket, &mut endpoint, &events, params).await;
    debug!(event = ?terminal, "live websocket finished");
    let _ = events.send(terminal);
}

/// Pump the socket until it ends; returns the single terminal event.
async fn drive_connection(
    socket: &mut LiveWebSocket,
    endpoint: &mut ChannelEndpoint,
    events: &GatewayEventSender,
    params: ConnectionParams,
) -> GatewayEvent {
    let mut heartbeat = time::interval(params.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            changed = endpoint.shutdown_rx.changed() => {
                if changed.is_err() || *endpoint.shutdown_rx.borrow() {
                    let _ = socket.send(Message::Close(None)).await;
                    return GatewayEvent::Closed;
                }
            }
            frame = endpoint.input_rx.recv() => {
                let Some(frame) = frame else {
                    let _ = socket.send(Message::Close(None)).await;
                    return GatewayEvent::Closed;
                };
                if let Err(error) = socket.send(Message::Text(realtime_input_payload(&frame).into())).await {
                    return GatewayEvent::Error(format!("Live input send failed: {error}"));
                }
            }
            _ = heartbeat.tick() => {
                if let Err(error) = socket.send(Message::Ping(Default::default())).await {
                    return GatewayEvent::Error(format!("Live heartbeat failed: {error}"));
                }
            }
            incoming = socket.next() => {
                match incoming {
                    Some(Ok(message)) => {
                        if let Some(terminal) =
                            handle_server_frame(socket, events, message, params.output_format).await
                        {
                            return terminal;
                        }
                    }
                    Some(Err(error)) => {
                        return GatewayEvent::Error(format!("Live websocket receive failed: {error}"));
                    }
                    None => {
                        return GatewayEvent::Error("Live websocket ended without a close frame".into());
                    }
                }
            }
        }
    }
}

async fn handle_server_frame(
    socket: &mut LiveWebSocket,
    events: &GatewayEventSender,
    message: Message,
    fallback: PcmFormat,
) -> Option<GatewayEvent> {
    match message {
        Message::Text(text) => forward_payload(text.as_ref(), events, fallback),
        Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => forward_payload(&text, events, fallback),
            Err(_) => debug!("ignoring non-UTF-8 binary live frame"),
        },
        Message::Ping(payload) => {
            if let Err(error) = socket.send(Message::Pong(payload)).await {
                return Some(GatewayEvent::Error(format!("Live pong failed: {error}")));
            }
        }
        Message::Pong(_) | Message::Frame(_) => {}
        Message::Close(frame) => return Some(close_event(frame)),
    }
    None
}

fn forward_payload(payload: &str, events: &GatewayEventSender, fallback: PcmFormat) {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => {
            for event in parse_server_payload(&value, fallback) {
                let _ = events.send(event);
            }
        }
        Err(error) => warn!(error = %error, "dropping unparsable live payload"),
    }
}

/// Map one server JSON message to gateway events.
fn parse_server_payload(payload: &Value, fallback: PcmFormat) -> Vec<GatewayEvent> {
    let Some(object) = payload.as_object() else {
        return Vec::new();
    };
    let mut events = Vec::new();
    for (key, value) in object {
        match key.as_str() {
            "setupComplete" => events.push(GatewayEvent::Opened),
            "serverContent" => events.extend(
                ServerMessage::from_server_content(value, fallback)
                    .into_iter()
                    .map(GatewayEvent::Message),
            ),
            "usageMetadata" => {}
            other => events.push(GatewayEvent::Message(ServerMessage::Unknown {
                kind: other.to_string(),
            })),
        }
    }
    events
}

fn close_event(frame: Option<CloseFrame<'_>>) -> GatewayEvent {
    match frame {
        None => GatewayEvent::Closed,
        Some(frame) if frame.code == CloseCode::Normal => GatewayEvent::Closed,
        Some(frame) => GatewayEvent::Error(format!(
            "Live session closed by server ({}): {}",
            u16::from(frame.code),
            frame.reason
        )),
    }
}

fn build_live_url(base_url: &str, api_key: &str) -> Result<String, LiveError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(LiveError::Configuration(
            "Live base URL cannot be empty".into(),
        ));
    }
    let separator = if trimmed.contains('?') { "&" } else { "?" };
    Ok(format!("{trimmed}{separator}key={api_key}"))
}

fn build_setup_payload(setup: &LiveSetup) -> Result<String, LiveError> {
    let model = if setup.model.starts_with("models/") {
        setup.model.clone()
    } else {
        format!("models/{}", setup.model)
    };

    let mut body = Map::new();
    body.insert("model".into(), Value::String(model));
    body.insert(
        "generationConfig".into(),
        json!({
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": setup.voice}}
            }
        }),
    );
    if let Some(instruction) = &setup.system_instruction {
        body.insert(
            "systemInstruction".into(),
            json!({ "parts": [{ "text": instruction }] }),
        );
    }
    body.insert("inputAudioTranscription".into(), json!({}));
    body.insert("outputAudioTranscription".into(), json!({}));

    serde_json::to_string(&json!({ "setup": Value::Object(body) })).map_err(LiveError::from)
}

fn realtime_input_payload(frame: &AudioFrame) -> String {
    json!({
        "realtimeInput": {
            "mediaChunks": [{ "mimeType": frame.mime_type(), "data": frame.data() }]
        }
    })
    .to_string()
}

async fn connect_live_socket(url: &str) -> Result<LiveWebSocket, LiveError> {
    let request = url.into_client_request().map_err(|error| {
        LiveError::Configuration(format!("Invalid live websocket URL: {error}"))
    })?;
    connect_async(request)
        .await
        .map(|(socket, _)| socket)
        .map_err(map_connect_error)
}

fn map_connect_error(error: WsError) -> LiveError {
    match error {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            if matches!(status, 401 | 403) {
                LiveError::Authentication(format!(
                    "Live websocket authentication failed with status {status}"
                ))
            } else {
                LiveError::api(
                    status,
                    format!("Live websocket handshake failed with status {status}"),
                )
            }
        }
        WsError::Io(error) => LiveError::Io(error),
        WsError::Url(error) => {
            LiveError::Configuration(format!("Invalid live websocket URL: {error}"))
        }
        other => LiveError::Stream(format!("Live websocket connect failed: {other}")),
    }
}
