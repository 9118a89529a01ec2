pub mod action;
pub mod effect;
pub mod event;
pub mod reduce;
pub mod runtime;
pub mod state;
pub mod stream;
pub mod tool_call;
pub mod types;

#[cfg(test)]
mod tests;

pub use action::Action;
pub use effect::Effect;
pub use event::ConversationEvent;
pub use reduce::{InvalidActionKind, ReduceError, reduce, should_auto_continue};
pub use state::{AppState, ChatStatus, OperationKind, OperationState};
pub use stream::StreamEvent;
pub use tool_call::{ToolCallPart, ToolCallState, ToolOutcome, TransitionError};
pub use types::{NonEmptyString, OpId, ToolCallId, TurnId};
