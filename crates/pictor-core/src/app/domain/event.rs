use serde::{Deserialize, Serialize};

use super::state::ChatStatus;
use super::tool_call::{ToolCallPart, ToolCallState};
use super::types::{OpId, TurnId};
use crate::app::conversation::Turn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationInfo {
    /// Tool calls in the conversation still waiting for a result.
    pub pending_tool_calls: usize,
}

/// Change notifications broadcast to conversation subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    TurnAdded {
        turn: Turn,
    },
    TextAppended {
        turn_id: TurnId,
        delta: String,
    },
    ToolCallUpdated {
        turn_id: TurnId,
        previous: Option<ToolCallState>,
        part: ToolCallPart,
    },
    TurnSealed {
        turn_id: TurnId,
    },
    TurnAborted {
        turn_id: TurnId,
    },
    TurnFailed {
        turn_id: TurnId,
        error: String,
    },
    /// An open turn was dropped before any content arrived.
    TurnDiscarded {
        turn_id: TurnId,
    },
    StatusChanged {
        status: ChatStatus,
    },
    AutoContinued {
        from_turn: TurnId,
        op_id: OpId,
    },
    OperationCancelled {
        op_id: OpId,
        info: CancellationInfo,
    },
    Error {
        message: String,
    },
}
