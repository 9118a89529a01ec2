use serde_json::Value;

use super::event::ConversationEvent;
use super::types::{OpId, ToolCallId};
use crate::app::conversation::Turn;
use pictor_tools::ToolSchema;

#[derive(Debug, Clone)]
pub enum Effect {
    EmitEvent {
        event: ConversationEvent,
    },

    CallModel {
        op_id: OpId,
        turns: Vec<Turn>,
        tools: Vec<ToolSchema>,
    },

    ExecuteTool {
        tool_call_id: ToolCallId,
        tool_name: String,
        input: Value,
    },

    CancelOperation {
        op_id: OpId,
    },

    /// The call was resolved without the bridge; drop any local execution.
    CancelTool {
        tool_call_id: ToolCallId,
    },
}
