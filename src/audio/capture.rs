//! Microphone capture: frame encoding and the capture pipeline.

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::codec::{encode_base64, quantize_pcm16};
use super::types::{AudioFrame, PcmFormat};
use crate::error::LiveError;
use crate::gateway::LiveChannel;

/// Converts captured float sample blocks into transport-ready PCM16 frames.
///
/// Pure and rate-agnostic: the sample rate only affects the MIME tag.
#[derive(Debug, Clone)]
pub struct CaptureEncoder {
    format: PcmFormat,
    mime_type: String,
}

impl CaptureEncoder {
    pub fn new(sample_rate: u32) -> Self {
        let format = PcmFormat::mono(sample_rate);
        Self {
            mime_type: format.mime_type(),
            format,
        }
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Encode one block of samples in `[-1.0, 1.0]`.
    pub fn encode(&self, samples: &[f32]) -> AudioFrame {
        let bytes = quantize_pcm16(samples);
        AudioFrame::new(self.mime_type.clone(), encode_base64(&bytes), samples.len())
    }
}

/// Parameters for a microphone access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub sample_rate: u32,
    /// Samples per delivered block.
    pub frame_size: usize,
}

/// Host microphone access.
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Ask the user for microphone access.
    ///
    /// Returns [`LiveError::PermissionDenied`] when the user declines.
    async fn request_access(
        &self,
        request: CaptureRequest,
    ) -> Result<Box<dyn MicrophoneStream>, LiveError>;
}

/// An open microphone stream delivering fixed-size mono sample blocks.
pub trait MicrophoneStream: Send {
    /// Take the block receiver. Only the first call returns `Some`.
    fn take_blocks(&mut self) -> Option<mpsc::UnboundedReceiver<Vec<f32>>>;

    /// Stop every track and release the device. Must be idempotent.
    fn stop(&mut self);
}

/// Running capture task: microphone blocks in, encoded frames out to the channel.
pub(crate) struct CapturePipeline {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl CapturePipeline {
    /// Spawn the pipeline. Frames are sent one per block, in capture order.
    pub(crate) fn spawn(
        mut blocks: mpsc::UnboundedReceiver<Vec<f32>>,
        encoder: CaptureEncoder,
        channel: LiveChannel,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut sent = 0u64;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    block = blocks.recv() => {
                        let Some(block) = block else { break };
                        let frame = encoder.encode(&block);
                        if let Err(error) = channel.send_realtime_input(frame) {
                            tracing::debug!(error = %error, sent, "capture stopped: channel rejected frame");
                            break;
                        }
                        sent += 1;
                    }
                }
            }
            tracing::debug!(sent, "capture pipeline finished");
        });
        Self { cancel, task }
    }

    pub(crate) fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}
