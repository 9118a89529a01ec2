use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Result, eyre};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use super::Command;
use crate::render::TranscriptRenderer;
use pictor_core::api::OpenAiClient;
use pictor_core::app::domain::event::ConversationEvent;
use pictor_core::app::domain::state::AppState;
use pictor_core::app::{ConversationConfig, ConversationError, ConversationHandle};
use pictor_core::config::Config;
use pictor_core::tools::{ChannelNotifier, HttpImageGenerator, Notification, ToolExecutorBridge};

const TARGET: &str = "pictor::chat";
const QUIT_COMMAND: &str = "/quit";
const CANCEL_COMMAND: &str = "/cancel";

pub struct ChatCommand {
    pub config: Config,
}

#[async_trait]
impl Command for ChatCommand {
    async fn execute(&self) -> Result<()> {
        let api_key = self.config.require_api_key()?;
        let model_service = Arc::new(
            OpenAiClient::with_base_url(api_key, self.config.api_base_url.as_deref())
                .map_err(|e| eyre!("Failed to create model client: {}", e))?,
        );

        let image_endpoint = self.config.require_image_endpoint()?;
        let image_generator = Arc::new(
            HttpImageGenerator::new(image_endpoint)
                .map_err(|e| eyre!("Failed to create image client: {}", e))?,
        );

        let (notifier, notifications) = ChannelNotifier::channel();
        let bridge = Arc::new(
            ToolExecutorBridge::new(image_generator, Arc::new(notifier))
                .with_image_api_key(self.config.image_api_key.clone())
                .with_image_observer(Arc::new(|url: &str| {
                    info!(target: TARGET, url, "Image ready");
                })),
        );

        let handle = ConversationHandle::spawn(
            model_service,
            bridge,
            ConversationConfig::from(&self.config),
        );

        {
            let mut stdout = std::io::stdout();
            writeln!(
                stdout,
                "Chatting with {}. Type {CANCEL_COMMAND} to stop a response, {QUIT_COMMAND} to exit.",
                self.config.model
            )?;
        }

        let input = BufReader::new(tokio::io::stdin());
        let result = run_repl(&handle, notifications, input, std::io::stdout()).await;
        handle.shutdown();
        result.map(|_| ())
    }
}

/// Reads one message per line from `input` and renders the conversation to
/// `output` until `/quit`. At end of input, waits for in-flight work to settle.
pub async fn run_repl<R, W>(
    handle: &ConversationHandle,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    input: R,
    output: W,
) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut events = handle.subscribe().await?;
    let mut renderer = TranscriptRenderer::new(output);
    let mut lines = input.lines();
    let mut input_closed = false;

    loop {
        tokio::select! {
            line = lines.next_line(), if !input_closed => {
                match line? {
                    Some(line) => {
                        if !handle_line(handle, &mut renderer, line.trim()).await? {
                            break;
                        }
                    }
                    None => {
                        debug!(target: TARGET, "Input closed");
                        input_closed = true;
                        if is_idle(&handle.state().await?) {
                            break;
                        }
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        renderer.event(&event)?;
                        if input_closed && settles(&event) && is_idle(&handle.state().await?) {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(target: TARGET, skipped, "Transcript lagged behind events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            Some(notification) = notifications.recv() => {
                renderer.notification(&notification)?;
            }
        }
    }

    // Render whatever was broadcast before the idle check.
    while let Ok(event) = events.try_recv() {
        renderer.event(&event)?;
    }
    while let Ok(notification) = notifications.try_recv() {
        renderer.notification(&notification)?;
    }

    Ok(renderer.into_inner())
}

/// Returns false when the user asked to quit.
async fn handle_line<W: Write>(
    handle: &ConversationHandle,
    renderer: &mut TranscriptRenderer<W>,
    line: &str,
) -> Result<bool> {
    match line {
        "" => Ok(true),
        QUIT_COMMAND => Ok(false),
        CANCEL_COMMAND => {
            handle.cancel().await?;
            Ok(true)
        }
        text => match handle.send(text).await {
            Ok(op_id) => {
                debug!(target: TARGET, %op_id, "Message sent");
                Ok(true)
            }
            Err(ConversationError::InvalidInput { message, .. }) => {
                renderer.line(&message)?;
                Ok(true)
            }
            Err(ConversationError::EmptyMessage) => Ok(true),
            Err(e) => Err(e.into()),
        },
    }
}

fn settles(event: &ConversationEvent) -> bool {
    matches!(
        event,
        ConversationEvent::StatusChanged { .. }
            | ConversationEvent::ToolCallUpdated { .. }
            | ConversationEvent::OperationCancelled { .. }
    )
}

/// No model call in flight and no tool call waiting for a result.
fn is_idle(state: &AppState) -> bool {
    !state.has_active_operation() && state.pending_tool_calls() == 0
}
