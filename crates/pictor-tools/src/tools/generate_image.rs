use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::schema::ToolSpec;

pub const GENERATE_TEXT_TO_IMAGE_TOOL_NAME: &str = "generateTextToImage";

/// The aspect ratio of the generated image
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
)]
#[schemars(inline)]
pub enum ImageSize {
    #[serde(rename = "landscape_4_3")]
    #[strum(serialize = "landscape_4_3")]
    Landscape4x3,
    #[serde(rename = "portrait_4_3")]
    #[strum(serialize = "portrait_4_3")]
    Portrait4x3,
    #[default]
    #[serde(rename = "square")]
    #[strum(serialize = "square")]
    Square,
    #[serde(rename = "landscape_16_9")]
    #[strum(serialize = "landscape_16_9")]
    Landscape16x9,
    #[serde(rename = "portrait_16_9")]
    #[strum(serialize = "portrait_16_9")]
    Portrait16x9,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTextToImageParams {
    /// The text prompt to generate an image from
    pub prompt: String,
    /// The aspect ratio of the generated image
    #[serde(default)]
    pub image_size: ImageSize,
}

/// Output record of a successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
}

pub struct GenerateTextToImageTool;

impl ToolSpec for GenerateTextToImageTool {
    type Params = GenerateTextToImageParams;
    type Output = GeneratedImage;

    const NAME: &'static str = GENERATE_TEXT_TO_IMAGE_TOOL_NAME;
    const DESCRIPTION: &'static str = "Generate an image from a text prompt";

    fn validate(params: &Self::Params) -> Result<(), String> {
        if params.prompt.trim().is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        Ok(())
    }
}
