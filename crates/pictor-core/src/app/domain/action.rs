use serde::{Deserialize, Serialize};

use super::stream::StreamEvent;
use super::tool_call::ToolOutcome;
use super::types::{NonEmptyString, OpId, ToolCallId, TurnId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    SendUserMessage {
        op_id: OpId,
        turn_id: TurnId,
        text: NonEmptyString,
        timestamp: u64,
    },

    StreamEvent {
        op_id: OpId,
        event: StreamEvent,
        timestamp: u64,
    },

    /// The model stream for `op_id` ended without an error.
    ModelStreamFinished {
        op_id: OpId,
    },

    ToolExecutionStarted {
        tool_call_id: ToolCallId,
    },

    ToolResult {
        tool_call_id: ToolCallId,
        tool_name: String,
        outcome: ToolOutcome,
    },

    /// Cancels the in-flight invocation. `None` targets whatever is running.
    Cancel {
        op_id: Option<OpId>,
    },
}

impl Action {
    pub fn op_id(&self) -> Option<OpId> {
        match self {
            Action::SendUserMessage { op_id, .. }
            | Action::StreamEvent { op_id, .. }
            | Action::ModelStreamFinished { op_id } => Some(*op_id),
            Action::Cancel { op_id } => *op_id,
            Action::ToolExecutionStarted { .. } | Action::ToolResult { .. } => None,
        }
    }
}
