use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::provider::{ChatRequest, ModelService};
use crate::app::conversation::Turn;
use crate::app::domain::action::Action;
use crate::app::domain::stream::StreamEvent;
use crate::app::domain::types::OpId;
use crate::config::{Config, DEFAULT_MODEL, DEFAULT_STREAM_TIMEOUT_SECS, DEFAULT_SYSTEM_PROMPT};
use crate::utils::current_timestamp;
use pictor_tools::ToolSchema;

const TARGET: &str = "pictor::interpreter";

/// Settings applied to every model invocation of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationConfig {
    pub model: String,
    pub system_prompt: Option<String>,
    /// Upper bound on a whole model stream, from request to last event.
    pub stream_timeout: Duration,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            stream_timeout: Duration::from_secs(DEFAULT_STREAM_TIMEOUT_SECS),
        }
    }
}

impl From<&Config> for ConversationConfig {
    fn from(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            system_prompt: Some(config.system_prompt.clone()).filter(|p| !p.trim().is_empty()),
            stream_timeout: Duration::from_secs(config.stream_timeout_secs),
        }
    }
}

#[derive(Clone)]
pub(crate) struct EffectInterpreter {
    model_service: Arc<dyn ModelService>,
    config: ConversationConfig,
}

impl EffectInterpreter {
    pub(crate) fn new(model_service: Arc<dyn ModelService>, config: ConversationConfig) -> Self {
        Self {
            model_service,
            config,
        }
    }

    /// Forwards every event of one model invocation to the actor, then
    /// reports the finish. Stops silently once `token` is cancelled.
    pub(crate) async fn stream_model(
        &self,
        op_id: OpId,
        turns: Vec<Turn>,
        tools: Vec<ToolSchema>,
        token: CancellationToken,
        action_tx: mpsc::UnboundedSender<Action>,
    ) {
        let request = ChatRequest {
            model: self.config.model.clone(),
            system: self.config.system_prompt.clone(),
            turns,
            tools,
        };

        let deadline = tokio::time::sleep(self.config.stream_timeout);
        tokio::pin!(deadline);

        let send_event = |event: StreamEvent| {
            action_tx
                .send(Action::StreamEvent {
                    op_id,
                    event,
                    timestamp: current_timestamp(),
                })
                .is_ok()
        };

        let mut stream = tokio::select! {
            biased;
            () = token.cancelled() => return,
            () = &mut deadline => {
                send_event(self.timeout_event(op_id));
                return;
            }
            result = self.model_service.stream_chat(request, token.clone()) => match result {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(target: TARGET, %op_id, error = %e, "Model request failed");
                    send_event(StreamEvent::StreamError { message: e.to_string() });
                    return;
                }
            },
        };

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(target: TARGET, %op_id, "Model stream cancelled");
                    return;
                }
                () = &mut deadline => {
                    send_event(self.timeout_event(op_id));
                    return;
                }
                next = stream.next() => match next {
                    Some(event) => {
                        let is_error = event.is_error();
                        if !send_event(event) || is_error {
                            return;
                        }
                    }
                    None => break,
                },
            }
        }

        if action_tx.send(Action::ModelStreamFinished { op_id }).is_err() {
            debug!(target: TARGET, %op_id, "Conversation closed before stream finished");
        }
    }

    fn timeout_event(&self, op_id: OpId) -> StreamEvent {
        let secs = self.config.stream_timeout.as_secs();
        warn!(target: TARGET, %op_id, secs, "Model stream timed out");
        StreamEvent::StreamError {
            message: format!("Model response timed out after {secs}s"),
        }
    }
}
