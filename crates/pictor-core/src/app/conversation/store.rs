use std::collections::HashMap;
use thiserror::Error;

use super::message::{Part, Turn, TurnStatus};
use crate::app::domain::tool_call::ToolCallPart;
use crate::app::domain::types::{ToolCallId, TurnId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Turn {0} already exists")]
    DuplicateTurn(TurnId),

    #[error("Turn {0} not found")]
    TurnNotFound(TurnId),

    #[error("Turn {0} is not open")]
    TurnNotOpen(TurnId),

    #[error("Tool call {0} already exists")]
    DuplicateToolCall(ToolCallId),

    #[error("Turn {0} cannot be discarded")]
    NotDiscardable(TurnId),
}

/// Ordered log of turns with an index from tool call id to its part.
///
/// Turns are only ever appended, except that the last turn may be discarded
/// while it has no parts.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    turn_index: HashMap<TurnId, usize>,
    tool_call_index: HashMap<ToolCallId, (usize, usize)>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn turn(&self, id: &TurnId) -> Option<&Turn> {
        self.turn_index.get(id).map(|&idx| &self.turns[idx])
    }

    pub fn contains_turn(&self, id: &TurnId) -> bool {
        self.turn_index.contains_key(id)
    }

    pub fn push_turn(&mut self, turn: Turn) -> Result<(), StoreError> {
        if self.turn_index.contains_key(&turn.id) {
            return Err(StoreError::DuplicateTurn(turn.id));
        }
        if let Some(call) = turn
            .tool_calls()
            .find(|call| self.tool_call_index.contains_key(&call.tool_call_id))
        {
            return Err(StoreError::DuplicateToolCall(call.tool_call_id.clone()));
        }
        let turn_idx = self.turns.len();
        for (part_idx, part) in turn.parts.iter().enumerate() {
            if let Part::ToolCall(call) = part {
                self.tool_call_index
                    .insert(call.tool_call_id.clone(), (turn_idx, part_idx));
            }
        }
        self.turn_index.insert(turn.id.clone(), turn_idx);
        self.turns.push(turn);
        Ok(())
    }

    /// Appends text to the trailing text part of an open turn, starting a
    /// new text part when the turn ends with a tool call.
    pub fn append_text(&mut self, turn_id: &TurnId, delta: &str) -> Result<(), StoreError> {
        let turn = self.open_turn_mut(turn_id)?;
        match turn.parts.last_mut() {
            Some(Part::Text { text }) => text.push_str(delta),
            _ => turn.parts.push(Part::Text {
                text: delta.to_string(),
            }),
        }
        Ok(())
    }

    pub fn insert_tool_call(
        &mut self,
        turn_id: &TurnId,
        call: ToolCallPart,
    ) -> Result<(), StoreError> {
        if self.tool_call_index.contains_key(&call.tool_call_id) {
            return Err(StoreError::DuplicateToolCall(call.tool_call_id));
        }
        let turn_idx = self.index_of(turn_id)?;
        let turn = self.open_turn_mut(turn_id)?;
        let part_idx = turn.parts.len();
        let id = call.tool_call_id.clone();
        turn.parts.push(Part::ToolCall(call));
        self.tool_call_index.insert(id, (turn_idx, part_idx));
        Ok(())
    }

    pub fn tool_call(&self, id: &ToolCallId) -> Option<&ToolCallPart> {
        let &(turn_idx, part_idx) = self.tool_call_index.get(id)?;
        self.turns[turn_idx].parts[part_idx].as_tool_call()
    }

    pub fn tool_call_mut(&mut self, id: &ToolCallId) -> Option<&mut ToolCallPart> {
        let &(turn_idx, part_idx) = self.tool_call_index.get(id)?;
        match &mut self.turns[turn_idx].parts[part_idx] {
            Part::ToolCall(call) => Some(call),
            Part::Text { .. } => None,
        }
    }

    /// The turn that owns a tool call.
    pub fn tool_call_turn(&self, id: &ToolCallId) -> Option<&Turn> {
        let &(turn_idx, _) = self.tool_call_index.get(id)?;
        self.turns.get(turn_idx)
    }

    pub fn set_status(&mut self, turn_id: &TurnId, status: TurnStatus) -> Result<(), StoreError> {
        let idx = self.index_of(turn_id)?;
        let turn = &mut self.turns[idx];
        if !turn.is_open() {
            return Err(StoreError::TurnNotOpen(turn_id.clone()));
        }
        turn.status = status;
        Ok(())
    }

    /// Removes the last turn if it has no content.
    pub fn discard_empty(&mut self, turn_id: &TurnId) -> Result<Turn, StoreError> {
        let idx = self.index_of(turn_id)?;
        if idx + 1 != self.turns.len() || !self.turns[idx].is_empty() {
            return Err(StoreError::NotDiscardable(turn_id.clone()));
        }
        self.turn_index.remove(turn_id);
        self.turns
            .pop()
            .ok_or_else(|| StoreError::TurnNotFound(turn_id.clone()))
    }

    fn index_of(&self, turn_id: &TurnId) -> Result<usize, StoreError> {
        self.turn_index
            .get(turn_id)
            .copied()
            .ok_or_else(|| StoreError::TurnNotFound(turn_id.clone()))
    }

    fn open_turn_mut(&mut self, turn_id: &TurnId) -> Result<&mut Turn, StoreError> {
        let idx = self.index_of(turn_id)?;
        let turn = &mut self.turns[idx];
        if !turn.is_open() {
            return Err(StoreError::TurnNotOpen(turn_id.clone()));
        }
        Ok(turn)
    }
}
