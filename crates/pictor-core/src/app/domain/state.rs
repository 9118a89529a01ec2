use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use strum::Display;

use super::types::{OpId, TurnId};
use crate::app::conversation::{Conversation, Turn};
use pictor_tools::ToolSchema;

const MAX_CANCELLED_OPS: usize = 100;

/// Request lifecycle as seen by a chat surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChatStatus {
    #[default]
    Ready,
    /// Request issued, no stream events yet.
    Submitted,
    Streaming,
    /// The last invocation failed. Sending is allowed again.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    UserSend,
    AutoContinue { from_turn: TurnId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationState {
    pub op_id: OpId,
    pub kind: OperationKind,
    /// Assistant turn currently receiving events.
    pub open_turn: Option<TurnId>,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub conversation: Conversation,
    pub tools: Vec<ToolSchema>,
    pub status: ChatStatus,
    pub current_operation: Option<OperationState>,
    pub cancelled_ops: BTreeSet<OpId>,
    /// Set by cancel, cleared by the next user send.
    pub continuation_halted: bool,
    pub continued_turns: HashSet<TurnId>,
}

impl AppState {
    pub fn new(tools: Vec<ToolSchema>) -> Self {
        Self {
            conversation: Conversation::new(),
            tools,
            status: ChatStatus::Ready,
            current_operation: None,
            cancelled_ops: BTreeSet::new(),
            continuation_halted: false,
            continued_turns: HashSet::new(),
        }
    }

    pub fn has_active_operation(&self) -> bool {
        self.current_operation.is_some()
    }

    /// Tool calls with complete input still waiting for a result. Calls whose
    /// input never finished streaming are excluded; nothing will resolve them.
    pub fn pending_tool_calls(&self) -> usize {
        self.conversation
            .turns()
            .iter()
            .flat_map(Turn::tool_calls)
            .filter(|call| call.state.awaits_result())
            .count()
    }

    pub fn is_current_op(&self, op_id: OpId) -> bool {
        self.current_operation
            .as_ref()
            .is_some_and(|op| op.op_id == op_id)
    }

    pub fn start_operation(&mut self, op_id: OpId, kind: OperationKind) {
        self.current_operation = Some(OperationState {
            op_id,
            kind,
            open_turn: None,
        });
    }

    pub fn complete_operation(&mut self, op_id: OpId) -> Option<OperationState> {
        if self.is_current_op(op_id) {
            self.current_operation.take()
        } else {
            None
        }
    }

    pub fn record_cancelled_op(&mut self, op_id: OpId) {
        self.cancelled_ops.insert(op_id);
        // v7 ids sort by creation time
        if self.cancelled_ops.len() > MAX_CANCELLED_OPS {
            self.cancelled_ops.pop_first();
        }
    }

    pub fn is_op_cancelled(&self, op_id: &OpId) -> bool {
        self.cancelled_ops.contains(op_id)
    }

    pub fn open_turn(&self) -> Option<&TurnId> {
        self.current_operation
            .as_ref()
            .and_then(|op| op.open_turn.as_ref())
    }
}
