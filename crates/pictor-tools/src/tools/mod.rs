pub mod generate_image;

pub use generate_image::{
    GENERATE_TEXT_TO_IMAGE_TOOL_NAME, GenerateTextToImageParams, GenerateTextToImageTool,
    GeneratedImage, ImageSize,
};

use crate::schema::{ToolSchema, ToolSpec};

/// Schemas of every tool the client can execute, in declaration order.
pub fn client_tool_schemas() -> Vec<ToolSchema> {
    vec![GenerateTextToImageTool::schema()]
}
