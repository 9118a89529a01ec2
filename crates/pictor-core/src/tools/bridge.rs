use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::domain::action::Action;
use crate::app::domain::tool_call::ToolOutcome;
use crate::app::domain::types::ToolCallId;
use crate::tools::image::{ImageGenerationRequest, ImageGenerator};
use crate::tools::notify::{ImageObserver, Notification, Notifier};
use pictor_tools::tools::{
    GENERATE_TEXT_TO_IMAGE_TOOL_NAME, GenerateTextToImageParams, GenerateTextToImageTool,
};
use pictor_tools::{ToolError, ToolSpec};

const TARGET: &str = "pictor::bridge";

/// A tool call whose input is complete.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool_call_id: ToolCallId,
    pub tool_name: String,
    pub input: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Execution was handed to a background task.
    Spawned,
    /// The call was resolved immediately with an error.
    Rejected,
    /// The call was dispatched before.
    Duplicate,
}

/// Runs client-side tools and reports results as actions.
///
/// Each tool call id is dispatched at most once. Results are enqueued on the
/// conversation's action channel and never awaited by the caller. A call
/// cancelled with [`ToolExecutorBridge::cancel`] reports nothing.
pub struct ToolExecutorBridge {
    image_generator: Arc<dyn ImageGenerator>,
    notifier: Arc<dyn Notifier>,
    image_observer: Option<Arc<dyn ImageObserver>>,
    image_api_key: Option<String>,
    dispatched: Mutex<HashMap<ToolCallId, CancellationToken>>,
}

impl ToolExecutorBridge {
    pub fn new(image_generator: Arc<dyn ImageGenerator>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            image_generator,
            notifier,
            image_observer: None,
            image_api_key: None,
            dispatched: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_image_observer(mut self, observer: Arc<dyn ImageObserver>) -> Self {
        self.image_observer = Some(observer);
        self
    }

    /// Forwarded to the image service with every request.
    pub fn with_image_api_key(mut self, api_key: Option<String>) -> Self {
        self.image_api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    pub async fn dispatch(
        self: &Arc<Self>,
        invocation: ToolInvocation,
        action_tx: mpsc::UnboundedSender<Action>,
    ) -> DispatchOutcome {
        let ToolInvocation {
            tool_call_id,
            tool_name,
            input,
        } = invocation;

        let cancel_token = {
            let mut dispatched = self.dispatched.lock().await;
            if dispatched.contains_key(&tool_call_id) {
                debug!(target: TARGET, %tool_call_id, "Ignoring duplicate dispatch");
                return DispatchOutcome::Duplicate;
            }
            let token = CancellationToken::new();
            dispatched.insert(tool_call_id.clone(), token.clone());
            token
        };

        if tool_name != GENERATE_TEXT_TO_IMAGE_TOOL_NAME {
            self.resolve_failure(
                &tool_call_id,
                &tool_name,
                &ToolError::UnknownTool(tool_name.clone()),
                &action_tx,
            );
            return DispatchOutcome::Rejected;
        }

        let params = match GenerateTextToImageTool::parse_params(&input) {
            Ok(params) => params,
            Err(e) => {
                self.resolve_failure(&tool_call_id, &tool_name, &e, &action_tx);
                return DispatchOutcome::Rejected;
            }
        };

        if action_tx
            .send(Action::ToolExecutionStarted {
                tool_call_id: tool_call_id.clone(),
            })
            .is_err()
        {
            debug!(target: TARGET, %tool_call_id, "Conversation closed before execution");
        }

        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            bridge
                .run_image_generation(tool_call_id, tool_name, params, cancel_token, action_tx)
                .await;
        });

        DispatchOutcome::Spawned
    }

    /// Abandons a dispatched call. Its result and failure notification are
    /// dropped. The id stays marked as dispatched.
    pub async fn cancel(&self, tool_call_id: &ToolCallId) {
        if let Some(token) = self.dispatched.lock().await.get(tool_call_id) {
            debug!(target: TARGET, %tool_call_id, "Cancelling tool execution");
            token.cancel();
        }
    }

    async fn run_image_generation(
        &self,
        tool_call_id: ToolCallId,
        tool_name: String,
        params: GenerateTextToImageParams,
        cancel_token: CancellationToken,
        action_tx: mpsc::UnboundedSender<Action>,
    ) {
        let request = ImageGenerationRequest {
            prompt: params.prompt,
            image_size: params.image_size,
            api_key: self.image_api_key.clone(),
        };

        let result = tokio::select! {
            biased;
            () = cancel_token.cancelled() => {
                debug!(target: TARGET, %tool_call_id, "Tool execution cancelled");
                return;
            }
            result = self.image_generator.generate(request) => result,
        };

        match result {
            Ok(image) => {
                info!(target: TARGET, %tool_call_id, url = %image.url, "Image generated");
                let output = match serde_json::to_value(&image) {
                    Ok(output) => output,
                    Err(e) => {
                        let err = ToolError::execution(&tool_name, e.to_string());
                        self.resolve_failure(&tool_call_id, &tool_name, &err, &action_tx);
                        return;
                    }
                };
                send_result(
                    &action_tx,
                    tool_call_id,
                    tool_name,
                    ToolOutcome::Output { output },
                );
                if let Some(observer) = &self.image_observer {
                    observer.image_generated(&image.url);
                }
            }
            Err(e) => {
                let err = ToolError::execution(&tool_name, e.to_string());
                self.resolve_failure(&tool_call_id, &tool_name, &err, &action_tx);
            }
        }
    }

    /// Terminates the call with `output-error` and raises a notification.
    /// A notification failure is logged and does not affect the result.
    fn resolve_failure(
        &self,
        tool_call_id: &ToolCallId,
        tool_name: &str,
        error: &ToolError,
        action_tx: &mpsc::UnboundedSender<Action>,
    ) {
        let error_text = error.to_string();
        warn!(target: TARGET, %tool_call_id, tool_name, error = %error_text, "Tool call failed");

        send_result(
            action_tx,
            tool_call_id.clone(),
            tool_name.to_string(),
            ToolOutcome::Error {
                error_text: error_text.clone(),
            },
        );

        if let Err(e) = self
            .notifier
            .notify(Notification::generation_failed(error_text))
        {
            warn!(target: TARGET, %tool_call_id, error = %e, "Failed to raise notification");
        }
    }
}

fn send_result(
    action_tx: &mpsc::UnboundedSender<Action>,
    tool_call_id: ToolCallId,
    tool_name: String,
    outcome: ToolOutcome,
) {
    if action_tx
        .send(Action::ToolResult {
            tool_call_id,
            tool_name,
            outcome,
        })
        .is_err()
    {
        debug!(target: TARGET, "Conversation closed; dropping tool result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CountingImageGenerator, RecordingNotifier};
    use crate::tools::notify::{NotifyError, Severity};
    use pictor_tools::tools::GeneratedImage;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn sunset_image() -> GeneratedImage {
        GeneratedImage {
            url: "https://x/1.png".into(),
            width: 1280,
            height: 720,
            seed: 42,
        }
    }

    fn invocation(id: &str, tool_name: &str, input: Value) -> ToolInvocation {
        ToolInvocation {
            tool_call_id: ToolCallId::from_string(id),
            tool_name: tool_name.into(),
            input,
        }
    }

    async fn next_action(rx: &mut mpsc::UnboundedReceiver<Action>) -> Action {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for action")
            .expect("channel open")
    }

    #[tokio::test]
    async fn successful_generation_reports_output_and_observes_url() {
        let generator = Arc::new(CountingImageGenerator::succeeding(sunset_image()));
        let notifier = Arc::new(RecordingNotifier::default());
        let seen = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);
        let bridge = Arc::new(
            ToolExecutorBridge::new(generator.clone(), notifier.clone())
                .with_image_api_key(Some("user-key".into()))
                .with_image_observer(Arc::new(move |url: &str| {
                    sink.lock().expect("lock").push(url.to_string());
                })),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = bridge
            .dispatch(
                invocation(
                    "call_1",
                    GENERATE_TEXT_TO_IMAGE_TOOL_NAME,
                    json!({"prompt": "sunset", "imageSize": "landscape_16_9"}),
                ),
                tx,
            )
            .await;
        assert_eq!(outcome, DispatchOutcome::Spawned);

        assert!(matches!(next_action(&mut rx).await, Action::ToolExecutionStarted { .. }));
        match next_action(&mut rx).await {
            Action::ToolResult { outcome, .. } => assert_eq!(
                outcome,
                ToolOutcome::Output {
                    output: json!({"url": "https://x/1.png", "width": 1280, "height": 720, "seed": 42})
                }
            ),
            other => panic!("unexpected action {other:?}"),
        }

        assert_eq!(generator.calls(), 1);
        let request = generator.last_request().expect("request");
        assert_eq!(request.image_size, pictor_tools::tools::ImageSize::Landscape16x9);
        assert_eq!(request.api_key.as_deref(), Some("user-key"));
        assert_eq!(*seen.lock().expect("lock"), vec!["https://x/1.png".to_string()]);
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test]
    async fn duplicate_dispatch_generates_once() {
        let generator = Arc::new(CountingImageGenerator::succeeding(sunset_image()));
        let bridge = Arc::new(ToolExecutorBridge::new(
            generator.clone(),
            Arc::new(RecordingNotifier::default()),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let call = invocation(
            "call_1",
            GENERATE_TEXT_TO_IMAGE_TOOL_NAME,
            json!({"prompt": "sunset"}),
        );

        assert_eq!(bridge.dispatch(call.clone(), tx.clone()).await, DispatchOutcome::Spawned);
        assert_eq!(bridge.dispatch(call, tx).await, DispatchOutcome::Duplicate);

        next_action(&mut rx).await;
        next_action(&mut rx).await;
        assert!(rx.recv().await.is_none());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn generator_failure_reports_error_and_notifies() {
        let generator = Arc::new(CountingImageGenerator::failing("rate limited"));
        let notifier = Arc::new(RecordingNotifier::default());
        let bridge = Arc::new(ToolExecutorBridge::new(generator, notifier.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        bridge
            .dispatch(
                invocation(
                    "call_1",
                    GENERATE_TEXT_TO_IMAGE_TOOL_NAME,
                    json!({"prompt": "sunset"}),
                ),
                tx,
            )
            .await;

        next_action(&mut rx).await;
        match next_action(&mut rx).await {
            Action::ToolResult { outcome, .. } => assert_eq!(
                outcome,
                ToolOutcome::Error {
                    error_text: "rate limited".into()
                }
            ),
            other => panic!("unexpected action {other:?}"),
        }

        let notifications = notifier.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].title, "Generation failed");
        assert_eq!(notifications[0].description, "rate limited");
        assert_eq!(notifications[0].severity, Severity::Destructive);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_without_calling_generator() {
        let generator = Arc::new(CountingImageGenerator::succeeding(sunset_image()));
        let notifier = Arc::new(RecordingNotifier::default());
        let bridge = Arc::new(ToolExecutorBridge::new(generator.clone(), notifier.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = bridge
            .dispatch(
                invocation(
                    "call_1",
                    GENERATE_TEXT_TO_IMAGE_TOOL_NAME,
                    json!({"prompt": "  "}),
                ),
                tx,
            )
            .await;

        assert_eq!(outcome, DispatchOutcome::Rejected);
        match next_action(&mut rx).await {
            Action::ToolResult {
                outcome: ToolOutcome::Error { error_text },
                ..
            } => assert!(error_text.contains("prompt must not be empty")),
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(generator.calls(), 0);
        assert_eq!(notifier.notifications().len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_resolved_with_error() {
        let bridge = Arc::new(ToolExecutorBridge::new(
            Arc::new(CountingImageGenerator::succeeding(sunset_image())),
            Arc::new(RecordingNotifier::default()),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = bridge
            .dispatch(invocation("call_1", "webSearch", json!({})), tx)
            .await;

        assert_eq!(outcome, DispatchOutcome::Rejected);
        match next_action(&mut rx).await {
            Action::ToolResult {
                outcome: ToolOutcome::Error { error_text },
                ..
            } => assert_eq!(error_text, "Unknown tool: webSearch"),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[tokio::test]
    async fn notifier_failure_does_not_block_result() {
        let notifier = Arc::new(RecordingNotifier::failing_with(NotifyError::Closed));
        let bridge = Arc::new(ToolExecutorBridge::new(
            Arc::new(CountingImageGenerator::failing("rate limited")),
            notifier,
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();

        bridge
            .dispatch(
                invocation(
                    "call_1",
                    GENERATE_TEXT_TO_IMAGE_TOOL_NAME,
                    json!({"prompt": "sunset"}),
                ),
                tx,
            )
            .await;

        next_action(&mut rx).await;
        assert!(matches!(
            next_action(&mut rx).await,
            Action::ToolResult {
                outcome: ToolOutcome::Error { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancelled_call_reports_nothing() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let generator =
            Arc::new(CountingImageGenerator::failing("rate limited").gated(gate.clone()));
        let notifier = Arc::new(RecordingNotifier::default());
        let bridge = Arc::new(ToolExecutorBridge::new(generator, notifier.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let call = invocation(
            "call_1",
            GENERATE_TEXT_TO_IMAGE_TOOL_NAME,
            json!({"prompt": "sunset"}),
        );

        bridge.dispatch(call.clone(), tx.clone()).await;
        assert!(matches!(next_action(&mut rx).await, Action::ToolExecutionStarted { .. }));

        bridge.cancel(&call.tool_call_id).await;
        gate.notify_waiters();
        assert_eq!(bridge.dispatch(call, tx).await, DispatchOutcome::Duplicate);

        let closed = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("task finished");
        assert!(closed.is_none(), "unexpected action {closed:?}");
        assert!(notifier.notifications().is_empty());
    }
}
