use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use pictor_tools::tools::{GeneratedImage, ImageSize};

/// Shown when the service gives no usable reason for a failure.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to generate image";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationRequest {
    pub prompt: String,
    pub image_size: ImageSize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Error)]
pub enum ImageGenerationError {
    /// The service refused the request. Displays as the service's own message.
    #[error("{0}")]
    Rejected(String),

    #[error("Image service returned {status_code}: {details}")]
    Status { status_code: u16, details: String },

    #[error("Image service request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid image service response: {0}")]
    InvalidResponse(String),
}

/// Backend that turns a prompt into a hosted image.
#[async_trait]
pub trait ImageGenerator: Send + Sync + 'static {
    async fn generate(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<GeneratedImage, ImageGenerationError>;
}

/// Posts generation requests as JSON to a single endpoint.
#[derive(Clone)]
pub struct HttpImageGenerator {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpImageGenerator {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ImageGenerationError> {
        Ok(Self {
            http_client: reqwest::Client::builder().build()?,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<GeneratedImage, ImageGenerationError> {
        debug!(
            target: "pictor::image",
            endpoint = %self.endpoint,
            image_size = %request.image_size,
            "Requesting image generation"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &body));
        }

        serde_json::from_str::<GeneratedImage>(&body)
            .map_err(|e| ImageGenerationError::InvalidResponse(e.to_string()))
    }
}

/// Prefers a message carried in a JSON error body over the raw body.
fn error_from_body(status_code: u16, body: &str) -> ImageGenerationError {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        let error = value.get("error");
        error
            .and_then(|e| e.get("message"))
            .or(error)
            .or_else(|| value.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    match message {
        Some(message) if !message.trim().is_empty() => ImageGenerationError::Rejected(message),
        _ if body.trim().is_empty() => ImageGenerationError::Status {
            status_code,
            details: GENERIC_FAILURE_MESSAGE.to_string(),
        },
        _ => ImageGenerationError::Status {
            status_code,
            details: body.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn request_serializes_with_camel_case_and_optional_key() {
        let request = ImageGenerationRequest {
            prompt: "sunset".into(),
            image_size: ImageSize::Landscape16x9,
            api_key: None,
        };
        assert_eq!(
            serde_json::to_value(&request).expect("serialize"),
            json!({"prompt": "sunset", "imageSize": "landscape_16_9"})
        );

        let with_key = ImageGenerationRequest {
            api_key: Some("k".into()),
            ..request
        };
        assert_eq!(
            serde_json::to_value(&with_key).expect("serialize")["apiKey"],
            json!("k")
        );
    }

    #[rstest]
    #[case(r#"{"error": "rate limited"}"#, "rate limited")]
    #[case(r#"{"error": {"message": "rate limited"}}"#, "rate limited")]
    #[case(r#"{"message": "rate limited"}"#, "rate limited")]
    #[case("upstream exploded", "Image service returned 500: upstream exploded")]
    #[case("", "Image service returned 500: Failed to generate image")]
    fn error_bodies_map_to_messages(#[case] body: &str, #[case] expected: &str) {
        assert_eq!(error_from_body(500, body).to_string(), expected);
    }
}
