pub mod error;
pub mod openai;
pub mod provider;
pub mod sse;

pub use error::{ApiError, SseParseError};
pub use openai::OpenAiClient;
pub use provider::{ChatRequest, EventStream, ModelService};
