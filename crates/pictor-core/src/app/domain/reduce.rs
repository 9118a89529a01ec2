use serde_json::Value;
use tracing::{debug, warn};

use crate::app::conversation::{Role, StoreError, Turn, TurnStatus};
use crate::app::domain::action::Action;
use crate::app::domain::effect::Effect;
use crate::app::domain::event::{CancellationInfo, ConversationEvent};
use crate::app::domain::state::{AppState, ChatStatus, OperationKind};
use crate::app::domain::stream::StreamEvent;
use crate::app::domain::tool_call::{ToolCallPart, ToolCallState, ToolOutcome};
use crate::app::domain::types::{NonEmptyString, OpId, ToolCallId, TurnId};

const TARGET: &str = "pictor::reduce";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidActionKind {
    OperationInFlight,
    ToolCallsPending,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReduceError {
    #[error("{message}")]
    InvalidAction {
        message: String,
        kind: InvalidActionKind,
    },

    #[error("Invariant violated: {message}")]
    Invariant { message: String },
}

impl From<StoreError> for ReduceError {
    fn from(err: StoreError) -> Self {
        ReduceError::Invariant {
            message: err.to_string(),
        }
    }
}

pub fn reduce(state: &mut AppState, action: Action) -> Result<Vec<Effect>, ReduceError> {
    match action {
        Action::SendUserMessage {
            op_id,
            turn_id,
            text,
            timestamp,
        } => handle_send_user_message(state, op_id, turn_id, text, timestamp),

        Action::StreamEvent {
            op_id,
            event,
            timestamp,
        } => Ok(handle_stream_event(state, op_id, event, timestamp)),

        Action::ModelStreamFinished { op_id } => Ok(handle_model_stream_finished(state, op_id)),

        Action::ToolExecutionStarted { tool_call_id } => {
            Ok(handle_tool_execution_started(state, &tool_call_id))
        }

        Action::ToolResult {
            tool_call_id,
            tool_name,
            outcome,
        } => Ok(handle_tool_result(state, &tool_call_id, &tool_name, outcome)),

        Action::Cancel { op_id } => Ok(handle_cancel(state, op_id)),
    }
}

/// True when an assistant turn made at least one tool call and every call
/// has reached a terminal state.
pub fn should_auto_continue(turn: &Turn) -> bool {
    turn.role == Role::Assistant && turn.has_tool_calls() && turn.all_tool_calls_terminal()
}

fn handle_send_user_message(
    state: &mut AppState,
    op_id: OpId,
    turn_id: TurnId,
    text: NonEmptyString,
    timestamp: u64,
) -> Result<Vec<Effect>, ReduceError> {
    if state.has_active_operation() {
        return Err(ReduceError::InvalidAction {
            message: "Cannot send while a response is in progress".to_string(),
            kind: InvalidActionKind::OperationInFlight,
        });
    }
    // A late tool result must still find its own turn last to continue.
    let pending = state.pending_tool_calls();
    if pending > 0 {
        return Err(ReduceError::InvalidAction {
            message: format!("Cannot send while {pending} tool call(s) are pending"),
            kind: InvalidActionKind::ToolCallsPending,
        });
    }

    let turn = Turn::user(turn_id, text, timestamp);
    state.conversation.push_turn(turn.clone())?;
    state.continuation_halted = false;

    let mut effects = vec![emit(ConversationEvent::TurnAdded { turn })];
    start_model_call(state, op_id, OperationKind::UserSend, &mut effects);
    Ok(effects)
}

fn handle_stream_event(
    state: &mut AppState,
    op_id: OpId,
    event: StreamEvent,
    timestamp: u64,
) -> Vec<Effect> {
    let mut effects = Vec::new();

    if state.is_op_cancelled(&op_id) || !state.is_current_op(op_id) {
        debug!(target: TARGET, %op_id, "Dropping stream event from inactive operation");
        return effects;
    }

    if !event.is_error() {
        set_status(state, ChatStatus::Streaming, &mut effects);
    }

    match event {
        StreamEvent::TurnStart { turn_id } => {
            apply_turn_start(state, turn_id, timestamp, &mut effects);
        }
        StreamEvent::TextDelta { delta } => apply_text_delta(state, delta, &mut effects),
        StreamEvent::ToolCallDelta {
            tool_call_id,
            tool_name,
            input_text_delta,
        } => apply_tool_call_delta(
            state,
            tool_call_id,
            tool_name,
            &input_text_delta,
            &mut effects,
        ),
        StreamEvent::ToolCallInputComplete {
            tool_call_id,
            tool_name,
            input,
        } => apply_tool_input_complete(state, tool_call_id, tool_name, input, &mut effects),
        StreamEvent::ToolCallOutput {
            tool_call_id,
            outcome,
        } => {
            // Resolved by the stream; local execution is no longer wanted.
            if apply_tool_outcome(state, &tool_call_id, outcome, &mut effects) {
                effects.push(Effect::CancelTool { tool_call_id });
            }
        }
        StreamEvent::TurnEnd => {
            if let Some(turn_id) = state.open_turn().cloned() {
                close_open_turn(state, &turn_id, TurnStatus::Sealed, &mut effects);
            } else {
                debug!(target: TARGET, %op_id, "Ignoring turn-end with no open turn");
            }
        }
        StreamEvent::StreamError { message } => {
            apply_stream_error(state, op_id, message, &mut effects);
        }
    }

    effects
}

fn apply_turn_start(
    state: &mut AppState,
    turn_id: TurnId,
    timestamp: u64,
    effects: &mut Vec<Effect>,
) {
    if state.conversation.contains_turn(&turn_id) {
        warn!(target: TARGET, %turn_id, "Ignoring turn-start for an existing turn");
        return;
    }

    if let Some(previous) = state.open_turn().cloned() {
        warn!(
            target: TARGET,
            previous = %previous,
            %turn_id,
            "turn-start while another turn is open; sealing the previous turn"
        );
        close_open_turn(state, &previous, TurnStatus::Sealed, effects);
    }

    let turn = Turn::assistant(turn_id.clone(), timestamp);
    if let Err(e) = state.conversation.push_turn(turn.clone()) {
        warn!(target: TARGET, %turn_id, error = %e, "Failed to open assistant turn");
        return;
    }
    if let Some(op) = state.current_operation.as_mut() {
        op.open_turn = Some(turn_id);
    }
    effects.push(emit(ConversationEvent::TurnAdded { turn }));
}

fn apply_text_delta(state: &mut AppState, delta: String, effects: &mut Vec<Effect>) {
    if delta.is_empty() {
        return;
    }
    let Some(turn_id) = state.open_turn().cloned() else {
        warn!(target: TARGET, "Dropping text delta with no open turn");
        return;
    };

    match state.conversation.append_text(&turn_id, &delta) {
        Ok(()) => effects.push(emit(ConversationEvent::TextAppended { turn_id, delta })),
        Err(e) => warn!(target: TARGET, %turn_id, error = %e, "Dropping text delta"),
    }
}

fn apply_tool_call_delta(
    state: &mut AppState,
    tool_call_id: ToolCallId,
    tool_name: String,
    fragment: &str,
    effects: &mut Vec<Effect>,
) {
    if let Some(part) = state.conversation.tool_call_mut(&tool_call_id) {
        let previous = part.state;
        if let Err(e) = part.append_input(fragment) {
            debug!(target: TARGET, %tool_call_id, error = %e, "Dropping late tool input delta");
            return;
        }
        emit_tool_call_update(state, &tool_call_id, Some(previous), effects);
        return;
    }

    let Some(turn_id) = state.open_turn().cloned() else {
        warn!(target: TARGET, %tool_call_id, "Dropping tool input delta with no open turn");
        return;
    };

    let mut part = ToolCallPart::streaming(tool_call_id.clone(), tool_name);
    if let Err(e) = part.append_input(fragment) {
        warn!(target: TARGET, %tool_call_id, error = %e, "Dropping tool input delta");
        return;
    }
    if let Err(e) = state.conversation.insert_tool_call(&turn_id, part) {
        warn!(target: TARGET, %tool_call_id, error = %e, "Dropping tool input delta");
        return;
    }
    emit_tool_call_update(state, &tool_call_id, None, effects);
}

fn apply_tool_input_complete(
    state: &mut AppState,
    tool_call_id: ToolCallId,
    tool_name: String,
    input: Value,
    effects: &mut Vec<Effect>,
) {
    let previous = match state.conversation.tool_call_mut(&tool_call_id) {
        Some(part) if part.state == ToolCallState::InputStreaming => {
            if let Err(e) = part.complete_input(input) {
                warn!(target: TARGET, %tool_call_id, error = %e, "Dropping tool input completion");
                return;
            }
            Some(ToolCallState::InputStreaming)
        }
        Some(part) => {
            debug!(
                target: TARGET,
                %tool_call_id,
                state = %part.state,
                "Ignoring duplicate tool input completion"
            );
            return;
        }
        None => {
            let Some(turn_id) = state.open_turn().cloned() else {
                warn!(target: TARGET, %tool_call_id, "Dropping tool input completion with no open turn");
                return;
            };
            let part = ToolCallPart::with_input(tool_call_id.clone(), tool_name, input);
            if let Err(e) = state.conversation.insert_tool_call(&turn_id, part) {
                warn!(target: TARGET, %tool_call_id, error = %e, "Dropping tool input completion");
                return;
            }
            None
        }
    };

    emit_tool_call_update(state, &tool_call_id, previous, effects);

    if let Some(part) = state.conversation.tool_call(&tool_call_id) {
        effects.push(Effect::ExecuteTool {
            tool_call_id,
            tool_name: part.tool_name.clone(),
            input: part.input.clone(),
        });
    }
}

/// Applies a terminal outcome. Returns whether the part changed.
fn apply_tool_outcome(
    state: &mut AppState,
    tool_call_id: &ToolCallId,
    outcome: ToolOutcome,
    effects: &mut Vec<Effect>,
) -> bool {
    let Some(part) = state.conversation.tool_call_mut(tool_call_id) else {
        warn!(target: TARGET, %tool_call_id, "Dropping result for unknown tool call");
        return false;
    };

    let previous = part.state;
    if previous.is_terminal() {
        debug!(target: TARGET, %tool_call_id, "Ignoring duplicate tool result");
        return false;
    }
    if let Err(e) = part.resolve(outcome) {
        warn!(target: TARGET, %tool_call_id, error = %e, "Dropping tool result");
        return false;
    }

    emit_tool_call_update(state, tool_call_id, Some(previous), effects);
    true
}

fn apply_stream_error(
    state: &mut AppState,
    op_id: OpId,
    message: String,
    effects: &mut Vec<Effect>,
) {
    warn!(target: TARGET, %op_id, error = %message, "Model stream failed");

    if let Some(turn_id) = state.open_turn().cloned() {
        close_open_turn(
            state,
            &turn_id,
            TurnStatus::Failed {
                error: message.clone(),
            },
            effects,
        );
    }

    state.complete_operation(op_id);
    effects.push(Effect::CancelOperation { op_id });
    set_status(state, ChatStatus::Error, effects);
    effects.push(emit(ConversationEvent::Error { message }));
}

fn handle_model_stream_finished(state: &mut AppState, op_id: OpId) -> Vec<Effect> {
    let mut effects = Vec::new();

    if !state.is_current_op(op_id) {
        debug!(target: TARGET, %op_id, "Ignoring finish of inactive operation");
        return effects;
    }

    if let Some(turn_id) = state.open_turn().cloned() {
        debug!(target: TARGET, %op_id, %turn_id, "Stream finished with the turn still open");
        close_open_turn(state, &turn_id, TurnStatus::Sealed, &mut effects);
    }

    state.complete_operation(op_id);
    set_status(state, ChatStatus::Ready, &mut effects);
    maybe_auto_continue(state, &mut effects);

    effects
}

fn handle_tool_execution_started(state: &mut AppState, tool_call_id: &ToolCallId) -> Vec<Effect> {
    let mut effects = Vec::new();

    let Some(part) = state.conversation.tool_call_mut(tool_call_id) else {
        warn!(target: TARGET, %tool_call_id, "Execution started for unknown tool call");
        return effects;
    };
    let previous = part.state;
    if let Err(e) = part.start_execution() {
        debug!(target: TARGET, %tool_call_id, error = %e, "Ignoring execution start");
        return effects;
    }

    emit_tool_call_update(state, tool_call_id, Some(previous), &mut effects);
    effects
}

fn handle_tool_result(
    state: &mut AppState,
    tool_call_id: &ToolCallId,
    tool_name: &str,
    outcome: ToolOutcome,
) -> Vec<Effect> {
    let mut effects = Vec::new();

    debug!(target: TARGET, %tool_call_id, tool_name, "Applying tool result");
    if apply_tool_outcome(state, tool_call_id, outcome, &mut effects) {
        maybe_auto_continue(state, &mut effects);
    }

    effects
}

fn handle_cancel(state: &mut AppState, target_op: Option<OpId>) -> Vec<Effect> {
    let mut effects = Vec::new();

    let op = match &state.current_operation {
        Some(op) if target_op.is_none_or(|t| t == op.op_id) => Some(op.clone()),
        None if target_op.is_none() => None,
        _ => {
            debug!(target: TARGET, ?target_op, "Ignoring cancel for inactive operation");
            return effects;
        }
    };

    state.continuation_halted = true;

    let Some(op) = op else {
        return effects;
    };

    state.record_cancelled_op(op.op_id);
    if let Some(turn_id) = &op.open_turn {
        close_open_turn(state, turn_id, TurnStatus::Aborted, &mut effects);
    }
    state.complete_operation(op.op_id);

    effects.push(emit(ConversationEvent::OperationCancelled {
        op_id: op.op_id,
        info: CancellationInfo {
            pending_tool_calls: state.pending_tool_calls(),
        },
    }));
    effects.push(Effect::CancelOperation { op_id: op.op_id });
    set_status(state, ChatStatus::Ready, &mut effects);

    effects
}

fn maybe_auto_continue(state: &mut AppState, effects: &mut Vec<Effect>) {
    if state.has_active_operation() || state.continuation_halted {
        return;
    }
    let Some(turn) = state.conversation.last() else {
        return;
    };
    if turn.status != TurnStatus::Sealed
        || state.continued_turns.contains(&turn.id)
        || !should_auto_continue(turn)
    {
        return;
    }

    let from_turn = turn.id.clone();
    let op_id = OpId::new();
    state.continued_turns.insert(from_turn.clone());

    debug!(target: TARGET, %op_id, %from_turn, "Auto-continuing after tool results");
    effects.push(emit(ConversationEvent::AutoContinued {
        from_turn: from_turn.clone(),
        op_id,
    }));
    start_model_call(state, op_id, OperationKind::AutoContinue { from_turn }, effects);
}

fn start_model_call(
    state: &mut AppState,
    op_id: OpId,
    kind: OperationKind,
    effects: &mut Vec<Effect>,
) {
    state.start_operation(op_id, kind);
    set_status(state, ChatStatus::Submitted, effects);
    effects.push(Effect::CallModel {
        op_id,
        turns: state.conversation.turns().to_vec(),
        tools: state.tools.clone(),
    });
}

/// Moves the open turn to `status`. A turn with no content is discarded
/// instead of being failed or aborted.
fn close_open_turn(
    state: &mut AppState,
    turn_id: &TurnId,
    status: TurnStatus,
    effects: &mut Vec<Effect>,
) {
    if let Some(op) = state.current_operation.as_mut()
        && op.open_turn.as_ref() == Some(turn_id)
    {
        op.open_turn = None;
    }

    let is_empty = state.conversation.turn(turn_id).is_some_and(Turn::is_empty);
    if is_empty && status != TurnStatus::Sealed {
        match state.conversation.discard_empty(turn_id) {
            Ok(_) => effects.push(emit(ConversationEvent::TurnDiscarded {
                turn_id: turn_id.clone(),
            })),
            Err(e) => warn!(target: TARGET, %turn_id, error = %e, "Failed to discard empty turn"),
        }
        return;
    }

    if let Err(e) = state.conversation.set_status(turn_id, status.clone()) {
        warn!(target: TARGET, %turn_id, error = %e, "Failed to close turn");
        return;
    }

    let turn_id = turn_id.clone();
    effects.push(emit(match status {
        TurnStatus::Sealed | TurnStatus::Open => ConversationEvent::TurnSealed { turn_id },
        TurnStatus::Aborted => ConversationEvent::TurnAborted { turn_id },
        TurnStatus::Failed { error } => ConversationEvent::TurnFailed { turn_id, error },
    }));
}

fn emit_tool_call_update(
    state: &AppState,
    tool_call_id: &ToolCallId,
    previous: Option<ToolCallState>,
    effects: &mut Vec<Effect>,
) {
    let turn = state.conversation.tool_call_turn(tool_call_id);
    let part = state.conversation.tool_call(tool_call_id);
    if let (Some(turn), Some(part)) = (turn, part) {
        effects.push(emit(ConversationEvent::ToolCallUpdated {
            turn_id: turn.id.clone(),
            previous,
            part: part.clone(),
        }));
    }
}

fn set_status(state: &mut AppState, status: ChatStatus, effects: &mut Vec<Effect>) {
    if state.status != status {
        state.status = status;
        effects.push(emit(ConversationEvent::StatusChanged { status }));
    }
}

fn emit(event: ConversationEvent) -> Effect {
    Effect::EmitEvent { event }
}
