use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::error::{ApiError, SseParseError};
use crate::api::provider::{ChatRequest, EventStream, ModelService};
use crate::api::sse::{SseEvent, parse_sse_stream};
use crate::app::conversation::{Role, ToolCallPart, Turn};
use crate::app::domain::stream::StreamEvent;
use crate::app::domain::types::{ToolCallId, TurnId};
use pictor_tools::ToolSchema;

pub const PROVIDER_NAME: &str = "openai";
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Chat completions client speaking the OpenAI streaming protocol.
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: reqwest::Client,
    chat_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str) -> Result<Self, ApiError> {
        Self::with_base_url(api_key, None)
    }

    pub fn with_base_url(api_key: &str, base_url: Option<&str>) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| ApiError::Configuration(format!("Invalid API key format: {e}")))?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http_client,
            chat_url: chat_completions_url(base_url.unwrap_or(DEFAULT_API_BASE_URL)),
        })
    }
}

fn chat_completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl ModelService for OpenAiClient {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
        token: CancellationToken,
    ) -> Result<EventStream, ApiError> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: build_messages(request.system.as_deref(), &request.turns),
            tools: request.tools.iter().map(OpenAiTool::from).collect(),
            stream: true,
        };

        debug!(
            target: "openai::stream",
            model = %request.model,
            messages = body.messages.len(),
            "Starting chat completion stream"
        );

        let response = tokio::select! {
            biased;
            () = token.cancelled() => {
                return Err(ApiError::Cancelled { provider: PROVIDER_NAME.to_string() });
            }
            response = self.http_client.post(&self.chat_url).json(&body).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            debug!(target: "openai::stream", %status, body = %details, "API error");
            return Err(ApiError::from_status(PROVIDER_NAME, status.as_u16(), details));
        }

        let sse_stream = parse_sse_stream(response.bytes_stream());
        Ok(Box::pin(convert_chat_stream(sse_stream, token)))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
    stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum OpenAiMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<OpenAiToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

impl From<&ToolSchema> for OpenAiTool {
    fn from(schema: &ToolSchema) -> Self {
        Self {
            tool_type: "function",
            function: OpenAiFunction {
                name: schema.name.clone(),
                description: schema.description.clone(),
                parameters: schema.input_schema.to_json(),
            },
        }
    }
}

/// Flattens turns into chat messages. Tool calls without a result yet are
/// left out, since the API rejects calls that have no matching tool message.
fn build_messages(system: Option<&str>, turns: &[Turn]) -> Vec<OpenAiMessage> {
    let mut messages = Vec::new();

    if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
        messages.push(OpenAiMessage::System {
            content: system.to_string(),
        });
    }

    for turn in turns {
        match turn.role {
            Role::System => messages.push(OpenAiMessage::System {
                content: turn.text(),
            }),
            Role::User => messages.push(OpenAiMessage::User {
                content: turn.text(),
            }),
            Role::Assistant => {
                let text = turn.text();
                let resolved: Vec<&ToolCallPart> =
                    turn.tool_calls().filter(|call| call.is_terminal()).collect();
                if text.is_empty() && resolved.is_empty() {
                    continue;
                }

                messages.push(OpenAiMessage::Assistant {
                    content: (!text.is_empty()).then_some(text),
                    tool_calls: resolved
                        .iter()
                        .map(|call| OpenAiToolCall {
                            id: call.tool_call_id.to_string(),
                            call_type: "function",
                            function: OpenAiFunctionCall {
                                name: call.tool_name.clone(),
                                arguments: call.input.to_string(),
                            },
                        })
                        .collect(),
                });
                messages.extend(resolved.iter().map(|call| OpenAiMessage::Tool {
                    tool_call_id: call.tool_call_id.to_string(),
                    content: tool_result_content(call),
                }));
            }
        }
    }

    messages
}

fn tool_result_content(call: &ToolCallPart) -> String {
    match (&call.output, &call.error_text) {
        (Some(output), _) => output.to_string(),
        (None, Some(error_text)) => error_text.clone(),
        (None, None) => String::new(),
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: String,
}

#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    args: String,
    /// Bytes of `args` already forwarded as deltas.
    emitted: usize,
    announced: bool,
}

impl ToolCallAccumulator {
    /// Input not yet forwarded, once the call's id and name are known.
    fn take_pending_delta(&mut self) -> Option<String> {
        if self.id.is_empty() || self.name.is_empty() {
            return None;
        }
        let pending = self.args.get(self.emitted..).unwrap_or_default().to_string();
        if pending.is_empty() && self.announced {
            return None;
        }
        self.emitted = self.args.len();
        self.announced = true;
        Some(pending)
    }
}

/// Arguments that do not parse are passed through as a string so input
/// validation can report them.
fn parse_tool_arguments(args: &str) -> Value {
    if args.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(args).unwrap_or_else(|_| Value::String(args.to_string()))
}

fn completion_events(tool_calls: BTreeMap<usize, ToolCallAccumulator>) -> Vec<StreamEvent> {
    let mut events = Vec::with_capacity(tool_calls.len() + 1);
    for (index, call) in tool_calls {
        if call.id.is_empty() || call.name.is_empty() {
            warn!(target: "openai::stream", index, "Dropping tool call without id or name");
            continue;
        }
        events.push(StreamEvent::ToolCallInputComplete {
            tool_call_id: ToolCallId::from_string(call.id),
            tool_name: call.name,
            input: parse_tool_arguments(&call.args),
        });
    }
    events.push(StreamEvent::TurnEnd);
    events
}

fn stream_error(message: impl Into<String>) -> StreamEvent {
    StreamEvent::StreamError {
        message: message.into(),
    }
}

fn convert_chat_stream(
    mut sse_stream: impl Stream<Item = Result<SseEvent, SseParseError>> + Unpin + Send + 'static,
    token: CancellationToken,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    async_stream::stream! {
        let mut started = false;
        let mut finished = false;
        let mut tool_calls: BTreeMap<usize, ToolCallAccumulator> = BTreeMap::new();

        loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(target: "openai::stream", "Stream cancelled");
                    break;
                }
                next = sse_stream.next() => next,
            };

            let Some(event) = next else {
                if finished {
                    for event in completion_events(std::mem::take(&mut tool_calls)) {
                        yield event;
                    }
                } else {
                    yield stream_error("Model stream ended unexpectedly");
                }
                break;
            };

            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    yield stream_error(e.to_string());
                    break;
                }
            };

            if event.event_type.as_deref() == Some("error") {
                yield stream_error(event.data);
                break;
            }

            if event.data == "[DONE]" {
                if started {
                    for event in completion_events(std::mem::take(&mut tool_calls)) {
                        yield event;
                    }
                }
                break;
            }

            let chunk: ChatCompletionChunk = match serde_json::from_str(&event.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield stream_error(format!("Failed to parse stream chunk: {e}"));
                    break;
                }
            };

            if let Some(error) = chunk.error {
                yield stream_error(error.message);
                break;
            }

            if !started {
                started = true;
                yield StreamEvent::TurnStart { turn_id: TurnId::new() };
            }

            for choice in chunk.choices {
                if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                    yield StreamEvent::TextDelta { delta: content };
                }

                for fragment in choice.delta.tool_calls.unwrap_or_default() {
                    let call = tool_calls.entry(fragment.index).or_default();
                    if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
                        call.id = id;
                    }
                    if let Some(function) = fragment.function {
                        if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                            call.name = name;
                        }
                        if let Some(arguments) = function.arguments {
                            call.args.push_str(&arguments);
                        }
                    }
                    if let Some(delta) = call.take_pending_delta() {
                        yield StreamEvent::ToolCallDelta {
                            tool_call_id: ToolCallId::from_string(call.id.clone()),
                            tool_name: call.name.clone(),
                            input_text_delta: delta,
                        };
                    }
                }

                if choice.finish_reason.is_some() {
                    finished = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::domain::tool_call::ToolOutcome;
    use futures::stream;
    use serde_json::json;
    use std::pin::pin;

    fn data(payload: &str) -> Result<SseEvent, SseParseError> {
        Ok(SseEvent {
            event_type: None,
            data: payload.to_string(),
        })
    }

    async fn collect(events: Vec<Result<SseEvent, SseParseError>>) -> Vec<StreamEvent> {
        let stream = convert_chat_stream(stream::iter(events), CancellationToken::new());
        stream.collect().await
    }

    #[tokio::test]
    async fn text_chunks_become_turn_events() {
        let events = collect(vec![
            data(r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":"Hel"}}]}"#),
            data(r#"{"choices":[{"index":0,"delta":{"content":"lo"},"finish_reason":"stop"}]}"#),
            data("[DONE]"),
        ])
        .await;

        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], StreamEvent::TurnStart { .. }));
        assert_eq!(events[1], StreamEvent::TextDelta { delta: "Hel".into() });
        assert_eq!(events[2], StreamEvent::TextDelta { delta: "lo".into() });
        assert_eq!(events[3], StreamEvent::TurnEnd);
    }

    #[tokio::test]
    async fn tool_call_fragments_stream_then_complete() {
        let events = collect(vec![
            data(r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"generateTextToImage","arguments":""}}]}}]}"#),
            data(r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"prompt\":"}}]}}]}"#),
            data(r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"sunset\"}"}}]}}]}"#),
            data(r#"{"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#),
            data("[DONE]"),
        ])
        .await;

        let deltas: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolCallDelta { input_text_delta, .. } => Some(input_text_delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["", "{\"prompt\":", "\"sunset\"}"]);

        let complete = events
            .iter()
            .find_map(|e| match e {
                StreamEvent::ToolCallInputComplete {
                    tool_call_id,
                    tool_name,
                    input,
                } => Some((tool_call_id.clone(), tool_name.clone(), input.clone())),
                _ => None,
            })
            .expect("input complete");
        assert_eq!(complete.0, ToolCallId::from_string("call_1"));
        assert_eq!(complete.1, "generateTextToImage");
        assert_eq!(complete.2, json!({"prompt": "sunset"}));
        assert_eq!(events.last(), Some(&StreamEvent::TurnEnd));
    }

    #[tokio::test]
    async fn unparseable_arguments_pass_through_as_string() {
        let events = collect(vec![
            data(r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"generateTextToImage","arguments":"{oops"}}]}}]}"#),
            data("[DONE]"),
        ])
        .await;

        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::ToolCallInputComplete { input: Value::String(raw), .. } if raw == "{oops"
        )));
    }

    #[tokio::test]
    async fn error_chunk_and_transport_failure_become_stream_errors() {
        let events = collect(vec![data(r#"{"error":{"message":"quota exceeded"}}"#)]).await;
        assert_eq!(
            events,
            vec![StreamEvent::StreamError {
                message: "quota exceeded".into()
            }]
        );

        let events = collect(vec![
            data(r#"{"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#),
            Err(SseParseError::Transport {
                details: "connection reset".into(),
            }),
        ])
        .await;
        assert!(matches!(events.last(), Some(StreamEvent::StreamError { message }) if message.contains("connection reset")));
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error() {
        let events = collect(vec![data(
            r#"{"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#,
        )])
        .await;
        assert!(matches!(events.last(), Some(StreamEvent::StreamError { .. })));
    }

    #[tokio::test]
    async fn cancellation_stops_the_stream() {
        let token = CancellationToken::new();
        let sse = stream::iter(vec![data(r#"{"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#)])
            .chain(stream::pending());
        let mut events = pin!(convert_chat_stream(sse, token.clone()));

        assert!(matches!(events.next().await, Some(StreamEvent::TurnStart { .. })));
        assert!(matches!(events.next().await, Some(StreamEvent::TextDelta { .. })));
        token.cancel();
        assert!(events.next().await.is_none());
    }

    #[test]
    fn messages_include_only_resolved_tool_calls() {
        let mut assistant = Turn::assistant(TurnId::from_string("a1"), 0);
        assistant.parts.push(crate::app::conversation::Part::Text {
            text: "Generating".into(),
        });
        let mut done = ToolCallPart::with_input(
            ToolCallId::from_string("call_1"),
            "generateTextToImage",
            json!({"prompt": "sunset"}),
        );
        done.resolve(ToolOutcome::Output {
            output: json!({"url": "https://x/1.png"}),
        })
        .expect("resolve");
        let mut failed = ToolCallPart::with_input(
            ToolCallId::from_string("call_2"),
            "generateTextToImage",
            json!({"prompt": "moon"}),
        );
        failed
            .resolve(ToolOutcome::Error {
                error_text: "rate limited".into(),
            })
            .expect("resolve");
        let pending = ToolCallPart::streaming(ToolCallId::from_string("call_3"), "generateTextToImage");
        for call in [done, failed, pending] {
            assistant.parts.push(crate::app::conversation::Part::ToolCall(call));
        }

        let turns = vec![Turn::user(TurnId::from_string("u1"), "draw", 0), assistant];
        let messages = build_messages(Some("be helpful"), &turns);

        assert_eq!(messages.len(), 5);
        assert!(matches!(&messages[0], OpenAiMessage::System { content } if content == "be helpful"));
        assert!(matches!(&messages[1], OpenAiMessage::User { content } if content == "draw"));
        match &messages[2] {
            OpenAiMessage::Assistant {
                content,
                tool_calls,
            } => {
                assert_eq!(content.as_deref(), Some("Generating"));
                assert_eq!(tool_calls.len(), 2);
                assert_eq!(tool_calls[0].function.arguments, r#"{"prompt":"sunset"}"#);
            }
            other => panic!("expected assistant message, got {other:?}"),
        }
        assert_eq!(
            messages[3],
            OpenAiMessage::Tool {
                tool_call_id: "call_1".into(),
                content: r#"{"url":"https://x/1.png"}"#.into(),
            }
        );
        assert_eq!(
            messages[4],
            OpenAiMessage::Tool {
                tool_call_id: "call_2".into(),
                content: "rate limited".into(),
            }
        );
    }

    #[test]
    fn request_serializes_in_chat_completions_shape() {
        let tools = pictor_tools::tools::client_tool_schemas();
        let request = ChatCompletionRequest {
            model: "gpt-4o-mini",
            messages: vec![OpenAiMessage::User {
                content: "hi".into(),
            }],
            tools: tools.iter().map(OpenAiTool::from).collect(),
            stream: true,
        };
        let value = serde_json::to_value(&request).expect("serialize");

        assert_eq!(value["messages"][0], json!({"role": "user", "content": "hi"}));
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "generateTextToImage");
        assert_eq!(value["tools"][0]["function"]["parameters"]["required"], json!(["prompt"]));
        assert_eq!(value["stream"], true);
    }

    #[test]
    fn chat_url_is_normalized() {
        assert_eq!(
            chat_completions_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("http://localhost:8080/v1/chat/completions"),
            "http://localhost:8080/v1/chat/completions"
        );
    }
}
