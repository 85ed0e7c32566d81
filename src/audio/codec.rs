//! PCM16 quantization and base64 transport encoding.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::LiveError;

/// Scale between normalized float samples and 16-bit integers.
pub const PCM16_SCALE: f32 = 32768.0;

/// Encode raw bytes as standard base64 text.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64 text back to bytes.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, LiveError> {
    STANDARD
        .decode(text.trim())
        .map_err(|error| LiveError::Decode(format!("Invalid base64 audio payload: {error}")))
}

/// Quantize float samples to little-endian 16-bit PCM bytes.
///
/// Each sample is multiplied by 32768 and truncated toward zero. Values
/// outside the i16 range saturate and NaN becomes silence.
pub fn quantize_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        // `as` truncates toward zero and saturates.
        let value = (sample * PCM16_SCALE) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Reinterpret little-endian 16-bit PCM bytes as per-channel float samples.
///
/// Interleaved input is split into `channels` vectors of
/// `bytes.len() / 2 / channels` frames each. Trailing bytes that do not make
/// up a whole frame are ignored.
pub fn dequantize_pcm16(bytes: &[u8], channels: u16) -> Result<Vec<Vec<f32>>, LiveError> {
    if channels == 0 {
        return Err(LiveError::Decode(
            "Channel count must be at least 1".to_string(),
        ));
    }
    let channel_count = usize::from(channels);
    let frame_count = bytes.len() / 2 / channel_count;

    let mut output = vec![Vec::with_capacity(frame_count); channel_count];
    for (index, pair) in bytes
        .chunks_exact(2)
        .take(frame_count * channel_count)
        .enumerate()
    {
        let value = i16::from_le_bytes([pair[0], pair[1]]);
        output[index % channel_count].push(f32::from(value) / PCM16_SCALE);
    }
    Ok(output)
}
