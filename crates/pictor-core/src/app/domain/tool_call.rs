use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use thiserror::Error;

use super::types::ToolCallId;
use crate::utils::parse_partial_json;

/// Lifecycle of a single tool invocation.
///
/// `InputStreaming -> InputAvailable -> Executing -> OutputAvailable | OutputError`.
/// `InputAvailable` may resolve directly to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ToolCallState {
    InputStreaming,
    InputAvailable,
    Executing,
    OutputAvailable,
    OutputError,
}

impl ToolCallState {
    fn rank(self) -> u8 {
        match self {
            ToolCallState::InputStreaming => 0,
            ToolCallState::InputAvailable => 1,
            ToolCallState::Executing => 2,
            ToolCallState::OutputAvailable | ToolCallState::OutputError => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ToolCallState::OutputAvailable | ToolCallState::OutputError
        )
    }

    /// Input is complete and the result has not arrived yet.
    pub fn awaits_result(self) -> bool {
        matches!(
            self,
            ToolCallState::InputAvailable | ToolCallState::Executing
        )
    }

    pub fn can_transition_to(self, next: ToolCallState) -> bool {
        match (self, next) {
            (ToolCallState::InputStreaming, ToolCallState::InputAvailable)
            | (ToolCallState::InputAvailable, ToolCallState::Executing) => true,
            (ToolCallState::InputAvailable | ToolCallState::Executing, terminal) => {
                terminal.is_terminal()
            }
            _ => false,
        }
    }

    /// Monotonic ordering used to check observed state sequences.
    pub fn precedes(self, other: ToolCallState) -> bool {
        self.rank() < other.rank()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid tool call transition for {tool_call_id}: {from} -> {to}")]
pub struct TransitionError {
    pub tool_call_id: ToolCallId,
    pub from: ToolCallState,
    pub to: ToolCallState,
}

/// Final result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutcome {
    Output { output: Value },
    Error { error_text: String },
}

impl ToolOutcome {
    pub fn target_state(&self) -> ToolCallState {
        match self {
            ToolOutcome::Output { .. } => ToolCallState::OutputAvailable,
            ToolOutcome::Error { .. } => ToolCallState::OutputError,
        }
    }
}

/// A tool invocation inside an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPart {
    pub tool_call_id: ToolCallId,
    pub tool_name: String,
    pub state: ToolCallState,
    pub input: Value,
    #[serde(skip)]
    raw_input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

impl ToolCallPart {
    pub fn streaming(tool_call_id: ToolCallId, tool_name: impl Into<String>) -> Self {
        Self {
            tool_call_id,
            tool_name: tool_name.into(),
            state: ToolCallState::InputStreaming,
            input: Value::Null,
            raw_input: String::new(),
            output: None,
            error_text: None,
        }
    }

    pub fn with_input(tool_call_id: ToolCallId, tool_name: impl Into<String>, input: Value) -> Self {
        Self {
            tool_call_id,
            tool_name: tool_name.into(),
            state: ToolCallState::InputAvailable,
            input,
            raw_input: String::new(),
            output: None,
            error_text: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    /// Appends a raw input fragment and refreshes the partial parse.
    pub fn append_input(&mut self, fragment: &str) -> Result<(), TransitionError> {
        if self.state != ToolCallState::InputStreaming {
            return Err(self.transition_error(ToolCallState::InputStreaming));
        }
        self.raw_input.push_str(fragment);
        self.input = parse_partial_json(&self.raw_input);
        Ok(())
    }

    pub fn complete_input(&mut self, input: Value) -> Result<(), TransitionError> {
        self.transition(ToolCallState::InputAvailable)?;
        self.input = input;
        Ok(())
    }

    pub fn start_execution(&mut self) -> Result<(), TransitionError> {
        self.transition(ToolCallState::Executing)
    }

    pub fn resolve(&mut self, outcome: ToolOutcome) -> Result<(), TransitionError> {
        self.transition(outcome.target_state())?;
        match outcome {
            ToolOutcome::Output { output } => self.output = Some(output),
            ToolOutcome::Error { error_text } => self.error_text = Some(error_text),
        }
        Ok(())
    }

    fn transition(&mut self, next: ToolCallState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(self.transition_error(next));
        }
        self.state = next;
        Ok(())
    }

    fn transition_error(&self, to: ToolCallState) -> TransitionError {
        TransitionError {
            tool_call_id: self.tool_call_id.clone(),
            from: self.state,
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn part() -> ToolCallPart {
        ToolCallPart::streaming(ToolCallId::from_string("call_1"), "generateTextToImage")
    }

    #[rstest]
    #[case(ToolCallState::InputStreaming, ToolCallState::InputAvailable, true)]
    #[case(ToolCallState::InputAvailable, ToolCallState::Executing, true)]
    #[case(ToolCallState::InputAvailable, ToolCallState::OutputAvailable, true)]
    #[case(ToolCallState::InputAvailable, ToolCallState::OutputError, true)]
    #[case(ToolCallState::Executing, ToolCallState::OutputAvailable, true)]
    #[case(ToolCallState::Executing, ToolCallState::OutputError, true)]
    #[case(ToolCallState::InputStreaming, ToolCallState::Executing, false)]
    #[case(ToolCallState::InputStreaming, ToolCallState::OutputAvailable, false)]
    #[case(ToolCallState::InputStreaming, ToolCallState::OutputError, false)]
    #[case(ToolCallState::Executing, ToolCallState::InputAvailable, false)]
    #[case(ToolCallState::OutputAvailable, ToolCallState::OutputError, false)]
    #[case(ToolCallState::OutputError, ToolCallState::OutputAvailable, false)]
    #[case(ToolCallState::OutputAvailable, ToolCallState::Executing, false)]
    #[case(ToolCallState::Executing, ToolCallState::Executing, false)]
    fn transition_table(
        #[case] from: ToolCallState,
        #[case] to: ToolCallState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn streamed_input_is_parsed_incrementally() {
        let mut part = part();
        part.append_input(r#"{"prompt": "sun"#).expect("streaming");
        assert_eq!(part.input, json!({"prompt": "sun"}));
        part.append_input(r#"set"}"#).expect("streaming");
        assert_eq!(part.input, json!({"prompt": "sunset"}));
        assert_eq!(part.raw_input(), r#"{"prompt": "sunset"}"#);
    }

    #[test]
    fn terminal_state_requires_available_input() {
        let mut part = part();
        let err = part
            .resolve(ToolOutcome::Error {
                error_text: "boom".to_string(),
            })
            .expect_err("must pass through input-available");
        assert_eq!(err.from, ToolCallState::InputStreaming);
        assert_eq!(part.state, ToolCallState::InputStreaming);
        assert!(part.error_text.is_none());
    }

    #[test]
    fn terminal_state_is_final() {
        let mut part = part();
        part.complete_input(json!({"prompt": "sunset"})).expect("complete");
        part.start_execution().expect("execute");
        part.resolve(ToolOutcome::Output {
            output: json!({"url": "https://x/1.png"}),
        })
        .expect("resolve");

        assert!(part.is_terminal());
        assert!(part.resolve(ToolOutcome::Error { error_text: "late".to_string() }).is_err());
        assert!(part.append_input("x").is_err());
        assert_eq!(part.output, Some(json!({"url": "https://x/1.png"})));
        assert!(part.error_text.is_none());
    }

    #[test]
    fn state_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(ToolCallState::InputStreaming).expect("serialize"),
            json!("input-streaming")
        );
        assert_eq!(ToolCallState::OutputError.to_string(), "output-error");
    }
}
