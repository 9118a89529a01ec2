use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tool_call::ToolOutcome;
use super::types::{ToolCallId, TurnId};

/// Incremental output of one model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    TurnStart {
        turn_id: TurnId,
    },
    TextDelta {
        delta: String,
    },
    /// Raw fragment of a tool call's JSON input.
    ToolCallDelta {
        tool_call_id: ToolCallId,
        tool_name: String,
        input_text_delta: String,
    },
    ToolCallInputComplete {
        tool_call_id: ToolCallId,
        tool_name: String,
        input: Value,
    },
    /// Result of a tool the model service executed itself.
    ToolCallOutput {
        tool_call_id: ToolCallId,
        outcome: ToolOutcome,
    },
    TurnEnd,
    StreamError {
        message: String,
    },
}

impl StreamEvent {
    pub fn is_error(&self) -> bool {
        matches!(self, StreamEvent::StreamError { .. })
    }
}
