//! Incremental terminal rendering of streaming assistant messages
//!
//! The store only says *which* message changed. The renderer remembers how
//! much of each message it already printed and writes the rest.

use std::collections::HashMap;
use std::io::{self, Write};

use chat_core::{ChatConfig, ChatMessage, MessageId, MessageRole, ToolStatus};

#[derive(Default)]
struct Progress {
    printed: usize,
    tools: Vec<ToolStatus>,
}

/// Prints new assistant output as it arrives
pub struct Renderer {
    progress: HashMap<MessageId, Progress>,
    current: Option<MessageId>,
    line_open: bool,
    labelled: bool,
}

impl Renderer {
    /// `labelled` prefixes each model's output with its display name
    pub fn new(labelled: bool) -> Self {
        Self {
            progress: HashMap::new(),
            current: None,
            line_open: false,
            labelled,
        }
    }

    /// Print whatever `message` gained since the last call
    pub fn render(
        &mut self,
        message: &ChatMessage,
        config: &ChatConfig,
        out: &mut impl Write,
    ) -> io::Result<()> {
        if message.role != MessageRole::Assistant {
            return Ok(());
        }
        let label = message
            .target_model
            .as_deref()
            .or(message.agent_model.as_deref())
            .map_or("assistant", |m| config.display_name(m))
            .to_string();

        let progress = self.progress.entry(message.id.clone()).or_default();
        let fresh = message.content.get(progress.printed..).unwrap_or_default();
        let mut tool_notices = Vec::new();
        for (index, tool) in message.tools().iter().enumerate() {
            match progress.tools.get_mut(index) {
                None => {
                    progress.tools.push(tool.status);
                    tool_notices.push(format!("  -> {} ({})", tool.name, tool.id));
                    if tool.status.is_terminal() {
                        tool_notices.push(tool_line(&tool.name, tool.status));
                    }
                }
                Some(seen) if *seen != tool.status => {
                    *seen = tool.status;
                    tool_notices.push(tool_line(&tool.name, tool.status));
                }
                Some(_) => {}
            }
        }
        progress.printed = message.content.len();

        if !fresh.is_empty() {
            if self.current.as_ref() != Some(&message.id) {
                self.close_line(out)?;
                if self.labelled {
                    write!(out, "[{label}] ")?;
                }
                self.current = Some(message.id.clone());
            }
            write!(out, "{fresh}")?;
            self.line_open = true;
        }

        for notice in tool_notices {
            self.close_line(out)?;
            writeln!(out, "{notice}")?;
            self.current = None;
        }
        out.flush()
    }

    /// Whether `id` has been rendered during this turn
    pub fn tracks(&self, id: &MessageId) -> bool {
        self.progress.contains_key(id)
    }

    /// End the current output line, if any
    pub fn finish(&mut self, out: &mut impl Write) -> io::Result<()> {
        self.close_line(out)?;
        self.current = None;
        out.flush()
    }

    fn close_line(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.line_open {
            writeln!(out)?;
            self.line_open = false;
        }
        Ok(())
    }
}

fn tool_line(name: &str, status: ToolStatus) -> String {
    match status {
        ToolStatus::Running => format!("  .. {name} running"),
        ToolStatus::Complete => format!("  ok {name}"),
        ToolStatus::Error => format!("  !! {name} failed"),
    }
}

/// One line per message for `/history`
pub fn history_line(number: usize, message: &ChatMessage, config: &ChatConfig) -> String {
    let who = match (message.role, message.agent_model.as_deref()) {
        (MessageRole::Assistant, Some(model)) => config.display_name(model).to_string(),
        (role, _) => role.as_str().to_string(),
    };
    let mut flags = String::new();
    if message.edited {
        flags.push_str(" (edited)");
    }
    if message.cancelled {
        flags.push_str(" (cancelled)");
    }
    if message.truncated == Some(true) {
        flags.push_str(" (truncated)");
    }
    let first_line = message.content.lines().next().unwrap_or_default();
    format!("{number:>3} {who}{flags}: {first_line}")
}
