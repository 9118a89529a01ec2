use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::api::error::ApiError;
use crate::app::conversation::Turn;
use crate::app::domain::stream::StreamEvent;
use pictor_tools::ToolSchema;

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolSchema>,
}

/// A hosted model that answers a conversation with a stream of events.
///
/// Transport failures after the stream has started are reported in-band as
/// `StreamEvent::StreamError`. The stream should stop once `token` is
/// cancelled.
#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn stream_chat(
        &self,
        request: ChatRequest,
        token: CancellationToken,
    ) -> Result<EventStream, ApiError>;
}
