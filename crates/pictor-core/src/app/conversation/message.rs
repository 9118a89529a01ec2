use serde::{Deserialize, Serialize};
use strum::Display;

use crate::app::domain::tool_call::ToolCallPart;
use crate::app::domain::types::TurnId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Still receiving stream events.
    Open,
    Sealed,
    /// Cancelled by the user while open.
    Aborted,
    /// The stream failed while the turn was open.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ToolCall(ToolCallPart),
}

impl Part {
    pub fn as_tool_call(&self) -> Option<&ToolCallPart> {
        match self {
            Part::ToolCall(call) => Some(call),
            Part::Text { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub role: Role,
    pub parts: Vec<Part>,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    pub status: TurnStatus,
}

impl Turn {
    /// User turns are complete on arrival.
    pub fn user(id: TurnId, text: impl Into<String>, created_at: u64) -> Self {
        Self {
            id,
            role: Role::User,
            parts: vec![Part::Text { text: text.into() }],
            created_at,
            status: TurnStatus::Sealed,
        }
    }

    pub fn system(id: TurnId, text: impl Into<String>, created_at: u64) -> Self {
        Self {
            id,
            role: Role::System,
            parts: vec![Part::Text { text: text.into() }],
            created_at,
            status: TurnStatus::Sealed,
        }
    }

    pub fn assistant(id: TurnId, created_at: u64) -> Self {
        Self {
            id,
            role: Role::Assistant,
            parts: Vec::new(),
            created_at,
            status: TurnStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TurnStatus::Open
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::ToolCall(_) => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallPart> {
        self.parts.iter().filter_map(Part::as_tool_call)
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }

    pub fn all_tool_calls_terminal(&self) -> bool {
        self.tool_calls().all(ToolCallPart::is_terminal)
    }
}
