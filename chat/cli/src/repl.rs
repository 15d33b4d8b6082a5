//! Input line parsing for the interactive chat

/// One parsed input line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Send text as a user message
    Send(String),
    /// Replace the target model set; empty means the default model
    SetModels(Vec<String>),
    /// Edit message number `index` (1-based, as shown by `/history`)
    Edit {
        /// 1-based message number
        index: usize,
        /// New content
        text: String,
    },
    /// Regenerate the turn behind message number `index`
    Regenerate {
        /// 1-based message number
        index: usize,
    },
    /// Drop the conversation and the session
    Clear,
    /// Print the conversation
    History,
    /// Print the current session id
    Session,
    /// Print command help
    Help,
    /// Leave
    Quit,
    /// Nothing to do (blank line)
    Empty,
    /// Malformed command, with a usage hint
    Invalid(String),
}

/// Help text for `/help`
pub const HELP: &str = "\
Commands:
  /models a,b      send following turns to these models (no list: default model)
  /edit N text     replace the content of message N
  /regen N         regenerate the turn behind message N
  /clear           start a new conversation
  /history         list messages with their numbers
  /session         show the current session id
  /help            show this help
  /quit            exit
Ctrl-C cancels a streaming turn.";

/// Parse one input line
#[must_use]
pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };

    let (name, args) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(name, args)| (name, args.trim()));

    match name {
        "models" | "model" => Command::SetModels(
            args.split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        "edit" => {
            let (number, text) = args
                .split_once(char::is_whitespace)
                .map_or((args, ""), |(n, t)| (n, t.trim()));
            match (parse_index(number), text.is_empty()) {
                (Some(index), false) => Command::Edit {
                    index,
                    text: text.to_string(),
                },
                _ => Command::Invalid("usage: /edit N text".to_string()),
            }
        }
        "regen" | "regenerate" => match parse_index(args) {
            Some(index) => Command::Regenerate { index },
            None => Command::Invalid("usage: /regen N".to_string()),
        },
        "clear" => Command::Clear,
        "history" => Command::History,
        "session" => Command::Session,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Invalid(format!("unknown command /{other}, try /help")),
    }
}

fn parse_index(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0)
}
