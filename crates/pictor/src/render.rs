//! Plain-text transcript rendering for the chat REPL.

use std::io::{self, Write};

use pictor_core::app::domain::event::ConversationEvent;
use pictor_core::app::domain::tool_call::{ToolCallPart, ToolCallState};
use pictor_core::tools::notify::{Notification, Severity};

/// One-line summary of a tool call in its current state.
pub fn render_tool_call(part: &ToolCallPart) -> String {
    match part.state {
        ToolCallState::InputStreaming => "Preparing to generate image...".to_string(),
        ToolCallState::InputAvailable | ToolCallState::Executing => {
            let prompt = part
                .input
                .get("prompt")
                .and_then(|p| p.as_str())
                .unwrap_or_default();
            format!("Generating image: \"{prompt}\"")
        }
        ToolCallState::OutputAvailable => part
            .output
            .as_ref()
            .and_then(|output| output.get("url"))
            .and_then(|url| url.as_str())
            .map_or_else(|| "No image generated".to_string(), |url| url.to_string()),
        ToolCallState::OutputError => format!(
            "Error: {}",
            part.error_text.as_deref().unwrap_or("Unknown error")
        ),
    }
}

pub fn render_notification(notification: &Notification) -> String {
    match notification.severity {
        Severity::Destructive => format!("! {}: {}", notification.title, notification.description),
        Severity::Default => format!("{}: {}", notification.title, notification.description),
    }
}

/// Writes conversation events as a running transcript.
pub struct TranscriptRenderer<W: Write> {
    out: W,
    mid_line: bool,
}

impl<W: Write> TranscriptRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            mid_line: false,
        }
    }

    pub fn event(&mut self, event: &ConversationEvent) -> io::Result<()> {
        match event {
            ConversationEvent::TextAppended { delta, .. } => {
                write!(self.out, "{delta}")?;
                self.mid_line = !delta.ends_with('\n');
                self.out.flush()
            }
            ConversationEvent::ToolCallUpdated { previous, part, .. } => {
                // Argument deltas don't change what is shown.
                if *previous == Some(part.state) {
                    return Ok(());
                }
                self.line(&format!("  {}", render_tool_call(part)))
            }
            ConversationEvent::TurnSealed { .. } => self.end_line(),
            ConversationEvent::TurnAborted { .. } => self.line("(cancelled)"),
            ConversationEvent::Error { message } => self.line(&format!("Error: {message}")),
            _ => Ok(()),
        }
    }

    pub fn notification(&mut self, notification: &Notification) -> io::Result<()> {
        self.line(&render_notification(notification))
    }

    /// Writes `text` on a line of its own.
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        self.end_line()?;
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.mid_line {
            writeln!(self.out)?;
            self.mid_line = false;
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pictor_core::app::domain::tool_call::ToolOutcome;
    use pictor_core::app::domain::types::{ToolCallId, TurnId};
    use serde_json::json;

    fn part() -> ToolCallPart {
        ToolCallPart::streaming(ToolCallId::from_string("call_1"), "generateTextToImage")
    }

    fn rendered(renderer: TranscriptRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).expect("utf8")
    }

    #[test]
    fn renders_each_tool_call_state() {
        let mut part = part();
        assert_eq!(render_tool_call(&part), "Preparing to generate image...");

        part.complete_input(json!({"prompt": "A sunset landscape"}))
            .expect("input");
        assert_eq!(render_tool_call(&part), "Generating image: \"A sunset landscape\"");

        part.start_execution().expect("execute");
        assert_eq!(render_tool_call(&part), "Generating image: \"A sunset landscape\"");

        part.resolve(ToolOutcome::Output {
            output: json!({"url": "https://x/1.png", "width": 1280, "height": 720, "seed": 42}),
        })
        .expect("resolve");
        assert_eq!(render_tool_call(&part), "https://x/1.png");
    }

    #[test]
    fn output_without_url_renders_placeholder() {
        let mut part = part();
        part.complete_input(json!({"prompt": "x"})).expect("input");
        part.resolve(ToolOutcome::Output { output: json!({}) })
            .expect("resolve");
        assert_eq!(render_tool_call(&part), "No image generated");
    }

    #[test]
    fn error_renders_error_text() {
        let mut part = part();
        part.complete_input(json!({"prompt": "x"})).expect("input");
        part.resolve(ToolOutcome::Error {
            error_text: "rate limited".to_string(),
        })
        .expect("resolve");
        assert_eq!(render_tool_call(&part), "Error: rate limited");
    }

    #[test]
    fn transcript_breaks_lines_around_tool_calls() {
        let turn_id = TurnId::from_string("turn_1");
        let mut renderer = TranscriptRenderer::new(Vec::new());

        renderer
            .event(&ConversationEvent::TextAppended {
                turn_id: turn_id.clone(),
                delta: "Sure, ".to_string(),
            })
            .expect("write");
        renderer
            .event(&ConversationEvent::TextAppended {
                turn_id: turn_id.clone(),
                delta: "drawing.".to_string(),
            })
            .expect("write");
        renderer
            .event(&ConversationEvent::ToolCallUpdated {
                turn_id: turn_id.clone(),
                previous: None,
                part: part(),
            })
            .expect("write");
        renderer
            .event(&ConversationEvent::ToolCallUpdated {
                turn_id: turn_id.clone(),
                previous: Some(ToolCallState::InputStreaming),
                part: part(),
            })
            .expect("write");
        renderer
            .event(&ConversationEvent::TurnSealed { turn_id })
            .expect("write");

        assert_eq!(
            rendered(renderer),
            "Sure, drawing.\n  Preparing to generate image...\n"
        );
    }

    #[test]
    fn notifications_and_errors_get_their_own_line() {
        let mut renderer = TranscriptRenderer::new(Vec::new());
        renderer
            .event(&ConversationEvent::TextAppended {
                turn_id: TurnId::from_string("turn_1"),
                delta: "partial".to_string(),
            })
            .expect("write");
        renderer
            .notification(&Notification::generation_failed("rate limited"))
            .expect("write");
        renderer
            .event(&ConversationEvent::Error {
                message: "upstream reset".to_string(),
            })
            .expect("write");

        assert_eq!(
            rendered(renderer),
            "partial\n! Generation failed: rate limited\nError: upstream reset\n"
        );
    }
}
