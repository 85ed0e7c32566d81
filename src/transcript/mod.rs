//! Turn-by-turn transcript aggregation for live sessions.

use serde::{Deserialize, Serialize};

use crate::store::{GenerationKind, GenerationRecord};

/// Input and output text of one conversational turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnTranscript {
    pub input: String,
    pub output: String,
}

impl TurnTranscript {
    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }
}

/// Accumulates partial transcript text into finalized turns.
///
/// Appends are plain concatenation. Each `finalize_turn` call moves the
/// pending pair onto the log exactly once and leaves both accumulators empty.
#[derive(Debug, Clone, Default)]
pub struct TranscriptAggregator {
    pending: TurnTranscript,
    turns: Vec<TurnTranscript>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_input(&mut self, text: &str) {
        self.pending.input.push_str(text);
    }

    pub fn append_output(&mut self, text: &str) {
        self.pending.output.push_str(text);
    }

    /// Push the pending pair onto the log and reset it.
    pub fn finalize_turn(&mut self) -> &TurnTranscript {
        let turn = std::mem::take(&mut self.pending);
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    /// Drop unfinished partial text without logging a turn.
    pub fn discard_pending(&mut self) {
        self.pending = TurnTranscript::default();
    }

    pub fn pending(&self) -> &TurnTranscript {
        &self.pending
    }

    pub fn turns(&self) -> &[TurnTranscript] {
        &self.turns
    }

    /// Summarize the finalized conversation as a history record.
    ///
    /// Returns `None` when no turn has been finalized.
    pub fn to_history_record(&self) -> Option<GenerationRecord> {
        if self.turns.is_empty() {
            return None;
        }
        let result = self
            .turns
            .iter()
            .map(|turn| format!("You: {}\nDeepberg: {}", turn.input, turn.output))
            .collect::<Vec<_>>()
            .join("\n\n");
        Some(GenerationRecord::new(
            GenerationKind::Live,
            "Live conversation",
            result,
        ))
    }
}
