pub mod conversation;
pub mod domain;

pub use conversation::{Conversation, Part, Role, Turn, TurnStatus};
pub use domain::runtime::{ConversationConfig, ConversationError, ConversationHandle};
pub use domain::state::{AppState, ChatStatus};
