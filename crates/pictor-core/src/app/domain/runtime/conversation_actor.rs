use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::api::provider::ModelService;
use crate::app::domain::action::Action;
use crate::app::domain::effect::Effect;
use crate::app::domain::event::ConversationEvent;
use crate::app::domain::reduce::{InvalidActionKind, ReduceError, reduce};
use crate::app::domain::state::AppState;
use crate::app::domain::types::{NonEmptyString, OpId, TurnId};
use crate::tools::bridge::{DispatchOutcome, ToolExecutorBridge, ToolInvocation};
use crate::utils::current_timestamp;
use pictor_tools::tools::client_tool_schemas;

use super::interpreter::{ConversationConfig, EffectInterpreter};

const TARGET: &str = "pictor::conversation";
const EVENT_BROADCAST_CAPACITY: usize = 256;
const COMMAND_CHANNEL_CAPACITY: usize = 32;

pub(crate) enum ConversationCmd {
    Dispatch {
        action: Box<Action>,
        reply: oneshot::Sender<Result<(), ConversationError>>,
    },
    Subscribe {
        reply: oneshot::Sender<broadcast::Receiver<ConversationEvent>>,
    },
    GetState {
        reply: oneshot::Sender<AppState>,
    },
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        kind: InvalidActionKind,
    },

    #[error("Reduce error: {message}")]
    ReduceError { message: String },

    #[error("Channel closed")]
    ChannelClosed,
}

/// Cheap-to-clone handle to a running conversation.
#[derive(Clone)]
pub struct ConversationHandle {
    cmd_tx: mpsc::Sender<ConversationCmd>,
}

impl ConversationHandle {
    /// Starts the conversation actor on the current tokio runtime.
    pub fn spawn(
        model_service: Arc<dyn ModelService>,
        bridge: Arc<ToolExecutorBridge>,
        config: ConversationConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let actor = ConversationActor::new(
            AppState::new(client_tool_schemas()),
            EffectInterpreter::new(model_service, config),
            bridge,
        );

        tokio::spawn(actor.run(cmd_rx));

        Self { cmd_tx }
    }

    /// Sends a user message. Returns the id of the model invocation it
    /// started.
    pub async fn send(&self, text: impl AsRef<str>) -> Result<OpId, ConversationError> {
        let text = NonEmptyString::new(text).ok_or(ConversationError::EmptyMessage)?;
        let op_id = OpId::new();
        self.dispatch(Action::SendUserMessage {
            op_id,
            turn_id: TurnId::new(),
            text,
            timestamp: current_timestamp(),
        })
        .await?;
        Ok(op_id)
    }

    pub async fn cancel(&self) -> Result<(), ConversationError> {
        self.dispatch(Action::Cancel { op_id: None }).await
    }

    pub async fn dispatch(&self, action: Action) -> Result<(), ConversationError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConversationCmd::Dispatch {
                action: Box::new(action),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ConversationError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ConversationError::ChannelClosed)?
    }

    pub async fn subscribe(
        &self,
    ) -> Result<broadcast::Receiver<ConversationEvent>, ConversationError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConversationCmd::Subscribe { reply: reply_tx })
            .await
            .map_err(|_| ConversationError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ConversationError::ChannelClosed)
    }

    /// Snapshot of the conversation state.
    pub async fn state(&self) -> Result<AppState, ConversationError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(ConversationCmd::GetState { reply: reply_tx })
            .await
            .map_err(|_| ConversationError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ConversationError::ChannelClosed)
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.try_send(ConversationCmd::Shutdown);
    }
}

struct ConversationActor {
    state: AppState,
    interpreter: EffectInterpreter,
    bridge: Arc<ToolExecutorBridge>,
    active_operations: HashMap<OpId, CancellationToken>,
    event_broadcast: broadcast::Sender<ConversationEvent>,
    internal_action_tx: mpsc::UnboundedSender<Action>,
    internal_action_rx: mpsc::UnboundedReceiver<Action>,
}

impl ConversationActor {
    fn new(
        state: AppState,
        interpreter: EffectInterpreter,
        bridge: Arc<ToolExecutorBridge>,
    ) -> Self {
        let (event_broadcast, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        let (internal_action_tx, internal_action_rx) = mpsc::unbounded_channel();

        Self {
            state,
            interpreter,
            bridge,
            active_operations: HashMap::new(),
            event_broadcast,
            internal_action_tx,
            internal_action_rx,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<ConversationCmd>) {
        loop {
            tokio::select! {
                biased;

                Some(cmd) = cmd_rx.recv() => {
                    match cmd {
                        ConversationCmd::Dispatch { action, reply } => {
                            let result = self.handle_action(*action).await;
                            let _ = reply.send(result);
                        }
                        ConversationCmd::Subscribe { reply } => {
                            let _ = reply.send(self.event_broadcast.subscribe());
                        }
                        ConversationCmd::GetState { reply } => {
                            let _ = reply.send(self.state.clone());
                        }
                        ConversationCmd::Shutdown => {
                            self.cancel_all_operations();
                            break;
                        }
                    }
                }

                Some(action) = self.internal_action_rx.recv() => {
                    if let Err(e) = self.handle_action(action).await {
                        tracing::error!(
                            target: TARGET,
                            error = %e,
                            "Failed to handle internal action"
                        );
                    }
                }

                else => break,
            }
        }

        tracing::debug!(target: TARGET, "Conversation actor stopped");
    }

    async fn handle_action(&mut self, action: Action) -> Result<(), ConversationError> {
        let finished_op = match &action {
            Action::ModelStreamFinished { op_id } => Some(*op_id),
            _ => None,
        };

        let effects = reduce(&mut self.state, action).map_err(|err| match err {
            ReduceError::InvalidAction { message, kind } => {
                ConversationError::InvalidInput { message, kind }
            }
            ReduceError::Invariant { message } => ConversationError::ReduceError { message },
        })?;

        if let Some(op_id) = finished_op {
            self.active_operations.remove(&op_id);
        }

        for effect in effects {
            self.handle_effect(effect).await;
        }

        Ok(())
    }

    async fn handle_effect(&mut self, effect: Effect) {
        match effect {
            Effect::EmitEvent { event } => {
                // No subscribers is fine.
                let _ = self.event_broadcast.send(event);
            }

            Effect::CallModel { op_id, turns, tools } => {
                let cancel_token = self.active_operations.entry(op_id).or_default().clone();
                let interpreter = self.interpreter.clone();
                let action_tx = self.internal_action_tx.clone();

                tracing::debug!(target: TARGET, %op_id, turns = turns.len(), "Calling model");
                tokio::spawn(async move {
                    interpreter
                        .stream_model(op_id, turns, tools, cancel_token, action_tx)
                        .await;
                });
            }

            Effect::ExecuteTool {
                tool_call_id,
                tool_name,
                input,
            } => {
                let invocation = ToolInvocation {
                    tool_call_id: tool_call_id.clone(),
                    tool_name,
                    input,
                };
                let outcome = self
                    .bridge
                    .dispatch(invocation, self.internal_action_tx.clone())
                    .await;
                if outcome == DispatchOutcome::Duplicate {
                    tracing::debug!(target: TARGET, %tool_call_id, "Tool call already dispatched");
                }
            }

            Effect::CancelOperation { op_id } => {
                if let Some(token) = self.active_operations.remove(&op_id) {
                    tracing::debug!(target: TARGET, %op_id, "Cancelling operation");
                    token.cancel();
                }
            }

            Effect::CancelTool { tool_call_id } => {
                self.bridge.cancel(&tool_call_id).await;
            }
        }
    }

    fn cancel_all_operations(&mut self) {
        for (_, token) in self.active_operations.drain() {
            token.cancel();
        }
    }
}
