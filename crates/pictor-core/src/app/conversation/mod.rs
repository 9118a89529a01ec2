mod message;
mod store;

pub use message::{Part, Role, Turn, TurnStatus};
pub use store::{Conversation, StoreError};

pub use crate::app::domain::tool_call::{ToolCallPart, ToolCallState};
