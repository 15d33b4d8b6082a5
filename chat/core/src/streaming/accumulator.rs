//! Turn Accumulator
//!
//! Pure per-worker state for one assistant turn. Deltas only ever append and
//! tool invocations only ever move from running to a terminal status, so the
//! accumulated value never regresses no matter how the bytes were fragmented.

use crate::messages::{ChatMessage, ToolExecution};
use crate::protocol::{tool_result_status, CompletionSummary, StreamEvent};

/// Accumulated state of one streaming assistant turn
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnAccumulator {
    content: String,
    thinking: Option<String>,
    /// Tool invocations of this worker only; result lookup never crosses workers
    tools: Option<Vec<ToolExecution>>,
}

impl TurnAccumulator {
    /// Create an empty accumulator
    #[must_use]
    pub fn new(tools_enabled: bool) -> Self {
        Self {
            content: String::new(),
            thinking: None,
            tools: tools_enabled.then(Vec::new),
        }
    }

    /// Apply a non-terminal event.
    ///
    /// Returns `true` if the accumulated state changed. Connection and
    /// terminal events are not accumulator state and return `false`.
    pub fn apply(&mut self, event: &StreamEvent) -> bool {
        match event {
            StreamEvent::Content { content } => {
                self.content.push_str(content);
                !content.is_empty()
            }
            StreamEvent::Thinking { content } => {
                self.thinking.get_or_insert_with(String::new).push_str(content);
                true
            }
            StreamEvent::ToolUse { id, name, input } => {
                tracing::debug!(tool_id = %id, tool = %name, "Tool invocation started");
                self.tools
                    .get_or_insert_with(Vec::new)
                    .push(ToolExecution::started(id.clone(), name.clone(), input.clone()));
                true
            }
            StreamEvent::ToolResult {
                tool_use_id,
                result,
                status,
                is_error,
            } => {
                let status = tool_result_status(*status, *is_error);
                let Some(tool) = self
                    .tools
                    .as_mut()
                    .and_then(|tools| tools.iter_mut().find(|t| &t.id == tool_use_id))
                else {
                    tracing::warn!(tool_id = %tool_use_id, "Result for unknown tool invocation ignored");
                    return false;
                };
                if !tool.finish(status, result.clone()) {
                    tracing::warn!(tool_id = %tool_use_id, "Duplicate tool result ignored");
                    return false;
                }
                true
            }
            StreamEvent::Connected { .. }
            | StreamEvent::Done(_)
            | StreamEvent::Cancelled(_)
            | StreamEvent::Error { .. } => false,
        }
    }

    /// Take the final text a terminal record carries.
    ///
    /// The carried text replaces the accumulated text only when it extends
    /// it (or equals it), so nothing already streamed is ever taken back.
    /// Returns `true` if anything changed.
    pub fn absorb_final(&mut self, summary: &CompletionSummary) -> bool {
        let mut changed = false;
        if let Some(ref text) = summary.content {
            if text.len() > self.content.len() && text.starts_with(self.content.as_str()) {
                self.content.clone_from(text);
                changed = true;
            } else if !text.starts_with(self.content.as_str())
                && !self.content.starts_with(text.as_str())
            {
                tracing::debug!("Final content diverges from streamed content, keeping streamed");
            }
        }
        if let Some(ref text) = summary.thinking {
            let current = self.thinking.as_deref().unwrap_or_default();
            if text.len() > current.len() && text.starts_with(current) {
                self.thinking = Some(text.clone());
                changed = true;
            }
        }
        changed
    }

    /// Accumulated answer text
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Accumulated reasoning text
    #[must_use]
    pub fn thinking(&self) -> Option<&str> {
        self.thinking.as_deref()
    }

    /// Tool invocations seen so far
    #[must_use]
    pub fn tools(&self) -> &[ToolExecution] {
        self.tools.as_deref().unwrap_or(&[])
    }

    /// Copy the accumulated state into the owned message
    pub fn write_into(&self, message: &mut ChatMessage) {
        message.content.clone_from(&self.content);
        message.thinking.clone_from(&self.thinking);
        if self.tools.is_some() {
            message.tool_executions.clone_from(&self.tools);
        }
    }
}

/// Record what a terminal event reported about the turn
pub fn apply_summary(message: &mut ChatMessage, summary: &CompletionSummary) {
    if summary.model.is_some() {
        message.agent_model.clone_from(&summary.model);
    }
    if summary.provider.is_some() {
        message.agent_provider.clone_from(&summary.provider);
    }
    message.input_tokens = summary.input_tokens.or(message.input_tokens);
    message.output_tokens = summary.output_tokens.or(message.output_tokens);
    message.thinking_tokens = summary.thinking_tokens.or(message.thinking_tokens);

    if summary.truncated.is_some() {
        message.truncated = summary.truncated;
        message.max_tokens_requested = summary.max_tokens_requested;
        message.model_limit = summary.model_limit;
        message.truncation_warning.clone_from(&summary.truncation_warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ToolStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn content(text: &str) -> StreamEvent {
        StreamEvent::Content {
            content: text.to_string(),
        }
    }

    fn tool_use(id: &str) -> StreamEvent {
        StreamEvent::ToolUse {
            id: id.to_string(),
            name: "search".to_string(),
            input: json!({"q": id}),
        }
    }

    fn tool_result(id: &str, is_error: bool) -> StreamEvent {
        StreamEvent::ToolResult {
            tool_use_id: id.to_string(),
            result: Some(json!(format!("result of {id}"))),
            status: None,
            is_error,
        }
    }

    #[test]
    fn test_content_only_grows() {
        let mut acc = TurnAccumulator::new(false);
        let mut seen = Vec::new();
        for delta in ["Hel", "lo", "", " there"] {
            acc.apply(&content(delta));
            seen.push(acc.content().to_string());
        }

        assert_eq!(seen, vec!["Hel", "Hello", "Hello", "Hello there"]);
        for pair in seen.windows(2) {
            assert!(pair[1].starts_with(pair[0].as_str()));
        }
    }

    #[test]
    fn test_thinking_is_independent_of_content() {
        let mut acc = TurnAccumulator::new(false);
        assert!(acc.thinking().is_none());

        acc.apply(&StreamEvent::Thinking {
            content: "step 1. ".to_string(),
        });
        acc.apply(&content("answer"));
        acc.apply(&StreamEvent::Thinking {
            content: "step 2.".to_string(),
        });

        assert_eq!(acc.thinking(), Some("step 1. step 2."));
        assert_eq!(acc.content(), "answer");
    }

    #[test]
    fn test_tool_lifecycle() {
        let mut acc = TurnAccumulator::new(true);
        assert!(acc.apply(&tool_use("t1")));
        assert!(acc.apply(&tool_use("t2")));
        assert_eq!(acc.tools()[0].status, ToolStatus::Running);

        assert!(acc.apply(&tool_result("t2", true)));
        assert!(acc.apply(&tool_result("t1", false)));

        assert_eq!(acc.tools()[0].status, ToolStatus::Complete);
        assert_eq!(acc.tools()[0].result, Some(json!("result of t1")));
        assert_eq!(acc.tools()[1].status, ToolStatus::Error);
        assert!(acc.tools()[1].completed_at.is_some());
    }

    #[test]
    fn test_tool_status_never_transitions_twice() {
        let mut acc = TurnAccumulator::new(true);
        acc.apply(&tool_use("t1"));
        assert!(acc.apply(&tool_result("t1", false)));
        assert!(!acc.apply(&tool_result("t1", true)));

        assert_eq!(acc.tools().len(), 1);
        assert_eq!(acc.tools()[0].status, ToolStatus::Complete);
    }

    #[test]
    fn test_tool_ids_are_scoped_per_accumulator() {
        let mut first = TurnAccumulator::new(true);
        let mut second = TurnAccumulator::new(true);
        first.apply(&tool_use("shared"));
        second.apply(&tool_use("shared"));

        assert!(second.apply(&tool_result("shared", true)));

        assert_eq!(first.tools()[0].status, ToolStatus::Running);
        assert_eq!(second.tools()[0].status, ToolStatus::Error);
    }

    #[test]
    fn test_unknown_tool_result_is_ignored() {
        let mut acc = TurnAccumulator::new(true);
        assert!(!acc.apply(&tool_result("ghost", false)));
        assert!(acc.tools().is_empty());
    }

    #[test]
    fn test_tool_use_without_tools_enabled() {
        let mut acc = TurnAccumulator::new(false);
        let mut message = ChatMessage::assistant_placeholder("m1", None, false);
        acc.write_into(&mut message);
        assert!(message.tool_executions.is_none());

        acc.apply(&tool_use("t1"));
        acc.write_into(&mut message);
        assert_eq!(message.tools().len(), 1);
    }

    #[test]
    fn test_apply_summary() {
        let mut message = ChatMessage::assistant_placeholder("requested", None, false);
        let summary = CompletionSummary {
            model: Some("served".to_string()),
            provider: Some("acme".to_string()),
            input_tokens: Some(5),
            output_tokens: Some(7),
            ..CompletionSummary::default()
        };

        apply_summary(&mut message, &summary);

        assert_eq!(message.agent_model.as_deref(), Some("served"));
        assert_eq!(message.agent_provider.as_deref(), Some("acme"));
        assert_eq!(message.output_tokens, Some(7));
        assert!(message.truncated.is_none());

        // Missing identity keeps the target model
        let mut message = ChatMessage::assistant_placeholder("requested", None, false);
        apply_summary(
            &mut message,
            &CompletionSummary {
                truncated: Some(true),
                model_limit: Some(4096),
                truncation_warning: Some("cut".to_string()),
                ..CompletionSummary::default()
            },
        );
        assert_eq!(message.agent_model.as_deref(), Some("requested"));
        assert_eq!(message.truncated, Some(true));
        assert_eq!(message.model_limit, Some(4096));
        assert_eq!(message.truncation_warning.as_deref(), Some("cut"));
    }

    #[test]
    fn test_final_text_from_terminal_record() {
        let mut acc = TurnAccumulator::new(false);
        let summary = CompletionSummary {
            content: Some("hi".to_string()),
            thinking: Some("short".to_string()),
            ..CompletionSummary::default()
        };
        assert!(acc.absorb_final(&summary));
        assert_eq!(acc.content(), "hi");
        assert_eq!(acc.thinking(), Some("short"));

        // Extends what was streamed
        let mut acc = TurnAccumulator::new(false);
        acc.apply(&content("Hel"));
        let summary = CompletionSummary {
            content: Some("Hello".to_string()),
            ..CompletionSummary::default()
        };
        assert!(acc.absorb_final(&summary));
        assert_eq!(acc.content(), "Hello");

        // Never shrinks or rewrites streamed text
        let shorter = CompletionSummary {
            content: Some("He".to_string()),
            ..CompletionSummary::default()
        };
        assert!(!acc.absorb_final(&shorter));
        let different = CompletionSummary {
            content: Some("Goodbye".to_string()),
            ..CompletionSummary::default()
        };
        assert!(!acc.absorb_final(&different));
        assert_eq!(acc.content(), "Hello");
        assert!(!acc.absorb_final(&CompletionSummary::default()));
    }
}
