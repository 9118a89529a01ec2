use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to serialize config: {0}")]
    ConfigSerialization(#[from] toml::ser::Error),

    #[error(transparent)]
    Conversation(#[from] pictor_core::app::ConversationError),

    #[error(transparent)]
    Core(#[from] pictor_core::Error),
}
