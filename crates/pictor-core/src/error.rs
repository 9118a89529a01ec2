use thiserror::Error;

use crate::api::error::ApiError;
use crate::app::domain::runtime::ConversationError;
use crate::tools::image::ImageGenerationError;
use pictor_tools::ToolError;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error(transparent)]
    ImageGeneration(#[from] ImageGenerationError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
