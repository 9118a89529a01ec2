mod conversation_actor;
mod interpreter;

pub use conversation_actor::{ConversationError, ConversationHandle};
pub use interpreter::ConversationConfig;
