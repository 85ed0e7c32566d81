//! Typed inbound messages.

use serde_json::Value;

use crate::audio::types::{AudioChunk, PcmFormat};

/// One piece of inbound content on a live channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    AudioPayload(AudioChunk),
    PartialInputText(String),
    PartialOutputText(String),
    TurnComplete,
    Interrupted,
    Unknown { kind: String },
}

impl ServerMessage {
    /// Expand a provider `serverContent` object into typed messages.
    ///
    /// Order is fixed: audio parts, input transcript, output transcript,
    /// turn complete, interrupted. Absent fields produce nothing. Audio parts
    /// without a rate in their MIME tag use `fallback`.
    pub fn from_server_content(content: &Value, fallback: PcmFormat) -> Vec<Self> {
        let mut messages = Vec::new();

        if let Some(parts) = content
            .pointer("/modelTurn/parts")
            .and_then(Value::as_array)
        {
            for part in parts {
                if let Some(chunk) = audio_chunk(part, fallback) {
                    messages.push(Self::AudioPayload(chunk));
                }
            }
        }

        if let Some(text) = string_at(content, "/inputTranscription/text") {
            messages.push(Self::PartialInputText(text));
        }
        if let Some(text) = string_at(content, "/outputTranscription/text") {
            messages.push(Self::PartialOutputText(text));
        }
        if flag(content, "turnComplete") {
            messages.push(Self::TurnComplete);
        }
        if flag(content, "interrupted") {
            messages.push(Self::Interrupted);
        }

        messages
    }
}

fn audio_chunk(part: &Value, fallback: PcmFormat) -> Option<AudioChunk> {
    let inline = part.get("inlineData")?;
    let data = inline.get("data")?.as_str()?;
    let format = match inline.get("mimeType").and_then(Value::as_str) {
        Some(mime) if !mime.trim().to_ascii_lowercase().starts_with("audio/") => return None,
        Some(mime) => PcmFormat::from_mime_type(mime, fallback),
        None => fallback,
    };
    Some(AudioChunk {
        data: data.to_string(),
        format,
    })
}

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn flag(value: &Value, field: &str) -> bool {
    value.get(field).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const FALLBACK: PcmFormat = PcmFormat::mono(24_000);

    #[test]
    fn empty_content_yields_nothing() {
        assert!(ServerMessage::from_server_content(&json!({}), FALLBACK).is_empty());
    }

    #[test]
    fn audio_parts_carry_their_rate() {
        let content = json!({
            "modelTurn": {"parts": [
                {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}},
                {"text": "ignored"},
                {"inlineData": {"mimeType": "audio/pcm;rate=16000", "data": "BBB="}},
                {"inlineData": {"mimeType": "image/png", "data": "CCC="}}
            ]}
        });
        assert_eq!(
            ServerMessage::from_server_content(&content, FALLBACK),
            vec![
                ServerMessage::AudioPayload(AudioChunk {
                    data: "AAA=".into(),
                    format: PcmFormat::mono(24_000),
                }),
                ServerMessage::AudioPayload(AudioChunk {
                    data: "BBB=".into(),
                    format: PcmFormat::mono(16_000),
                }),
            ]
        );
    }

    #[test]
    fn combined_content_is_expanded_in_dispatch_order() {
        let content = json!({
            "interrupted": true,
            "turnComplete": true,
            "outputTranscription": {"text": " there"},
            "inputTranscription": {"text": "hi"},
            "modelTurn": {"parts": [{"inlineData": {"data": "AAA="}}]}
        });
        assert_eq!(
            ServerMessage::from_server_content(&content, FALLBACK),
            vec![
                ServerMessage::AudioPayload(AudioChunk {
                    data: "AAA=".into(),
                    format: FALLBACK,
                }),
                ServerMessage::PartialInputText("hi".into()),
                ServerMessage::PartialOutputText(" there".into()),
                ServerMessage::TurnComplete,
                ServerMessage::Interrupted,
            ]
        );
    }

    #[test]
    fn false_flags_are_ignored() {
        let content = json!({"turnComplete": false, "interrupted": false});
        assert!(ServerMessage::from_server_content(&content, FALLBACK).is_empty());
    }
}
