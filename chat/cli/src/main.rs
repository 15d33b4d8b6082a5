//! gateway-chat - Interactive terminal chat against the model gateway
//!
//! Reads operator input line by line, sends it to one or more models and
//! prints their answers as they stream in. Ctrl-C cancels a streaming turn;
//! at the prompt it exits.

mod render;
mod repl;

use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat_core::{
    load_config, load_config_from_path, ChatOrchestrator, CompletionBackend, ConfigOverrides,
    GatewayClient, MessageId, MessageRole, SessionId, StoreChange, TurnOutcome,
};

use render::{history_line, Renderer};
use repl::Command;

/// Interactive chat against the model gateway
#[derive(Parser, Debug)]
#[command(name = "gateway-chat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short = 'c', long, env = "GATEWAY_CHAT_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Gateway base URL
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Gateway API key
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Models to send each turn to (repeat for several; default model if none)
    #[arg(short = 'm', long = "model", value_name = "MODEL")]
    pub models: Vec<String>,

    /// Resume a persisted gateway session
    #[arg(short = 's', long, value_name = "ID")]
    pub session: Option<String>,

    /// Sampling temperature
    #[arg(short = 't', long)]
    pub temperature: Option<f32>,

    /// Working directory passed to tool-enabled models
    #[arg(long, value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Let models invoke tools
    #[arg(long)]
    pub tools: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref url) = self.url {
            overrides = overrides.with_base_url(url.clone());
        }
        if let Some(ref key) = self.api_key {
            overrides = overrides.with_api_key(key.clone());
        }
        if let Some(temperature) = self.temperature {
            overrides = overrides.with_temperature(temperature);
        }
        if let Some(ref dir) = self.working_dir {
            overrides = overrides.with_working_dir(dir.clone());
        }
        if self.tools {
            overrides = overrides.with_tools_enabled(true);
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut config = match args.config {
        Some(ref path) => load_config_from_path(Some(path.clone())),
        None => load_config(),
    }
    .context("Failed to load configuration")?;
    args.overrides()
        .apply(&mut config)
        .context("Invalid command line overrides")?;

    info!(
        source = %config.source(),
        url = %config.gateway.base_url,
        model = %config.chat.default_model,
        "Configuration loaded"
    );

    let gateway = Arc::new(
        GatewayClient::new(&config.gateway).context("Failed to create gateway client")?,
    );
    if !gateway.health_check().await {
        warn!(url = %config.gateway.base_url, "Gateway health check failed, continuing anyway");
    }

    let chat = Arc::new(ChatOrchestrator::new(
        gateway.clone(),
        gateway,
        config.chat,
    ));

    if let Some(ref id) = args.session {
        let attached = chat
            .attach_session(&SessionId::from(id.as_str()))
            .await
            .with_context(|| format!("Failed to load session {id}"))?;
        if attached {
            print_history(&chat);
        }
    }

    run_repl(&chat, args.models).await
}

/// Initialize logging on stderr so it stays out of the chat output
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gateway_chat={level},chat_core={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    Ok(())
}

async fn run_repl(chat: &Arc<ChatOrchestrator>, mut models: Vec<String>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Connected. Type /help for commands.");

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match repl::parse(&line) {
            Command::Empty => {}
            Command::Send(text) => {
                let turn = chat.send_message(text, models.clone());
                drive_turn(chat, turn, models.len() > 1).await?;
            }
            Command::SetModels(list) => {
                models = list;
                if models.is_empty() {
                    println!("Using default model {}", chat.config().default_model);
                } else {
                    println!("Using {}", models.join(", "));
                }
            }
            Command::Edit { index, text } => match message_id(chat, index) {
                Some(id) if chat.edit_message(&id, text) => println!("Edited message {index}"),
                Some(_) => println!("Message {index} cannot be edited right now"),
                None => println!("No message {index}"),
            },
            Command::Regenerate { index } => match message_id(chat, index) {
                Some(id) => {
                    let labelled = regenerates_many(chat, index);
                    let turn = chat.regenerate_message(&id);
                    drive_turn(chat, turn, labelled).await?;
                }
                None => println!("No message {index}"),
            },
            Command::Clear => {
                if chat.clear_messages() {
                    println!("Conversation cleared");
                }
            }
            Command::History => print_history(chat),
            Command::Session => match chat.current_session_id() {
                Some(id) => println!("Session {id}"),
                None => println!("No session yet"),
            },
            Command::Help => println!("{}", repl::HELP),
            Command::Quit => break,
            Command::Invalid(hint) => println!("{hint}"),
        }
    }
    Ok(())
}

/// Run one turn while echoing its output and routing Ctrl-C to cancel
async fn drive_turn<F>(chat: &Arc<ChatOrchestrator>, turn: F, labelled: bool) -> Result<()>
where
    F: Future<Output = TurnOutcome>,
{
    let mut changes = chat.store().subscribe();
    let mut renderer = Renderer::new(labelled);
    let mut stdout = std::io::stdout();
    tokio::pin!(turn);

    let outcome = loop {
        tokio::select! {
            outcome = &mut turn => break outcome,
            change = changes.recv() => match change {
                Ok(StoreChange::Appended(id) | StoreChange::Updated(id)) => {
                    if let Some(message) = chat.store().get(&id) {
                        renderer.render(&message, chat.config(), &mut stdout)?;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    // Content is cumulative, so the next update catches up.
                    tracing::debug!(missed, "Renderer lagged behind store changes");
                }
                Err(RecvError::Closed) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                if chat.cancel_stream() {
                    eprintln!("\n(cancelling)");
                }
            }
        }
    };

    // Flush whatever the last change notifications did not cover.
    for message in chat.messages() {
        if renderer.tracks(&message.id) {
            renderer.render(&message, chat.config(), &mut stdout)?;
        }
    }
    renderer.finish(&mut stdout)?;

    match outcome {
        TurnOutcome::Completed => {}
        TurnOutcome::Cancelled => println!("(cancelled)"),
        TurnOutcome::Failed(error) => eprintln!("error: {error}"),
        TurnOutcome::Ignored => println!("(busy, try again when the current turn ends)"),
    }
    Ok(())
}

/// Whether regenerating message `index` fans out to more than one model
fn regenerates_many(chat: &ChatOrchestrator, index: usize) -> bool {
    let messages = chat.messages();
    messages
        .iter()
        .take(index)
        .rev()
        .find(|m| m.role == MessageRole::User)
        .and_then(|m| m.target_models.as_ref())
        .is_some_and(|models| models.len() > 1)
}

fn message_id(chat: &ChatOrchestrator, index: usize) -> Option<MessageId> {
    chat.messages().get(index.checked_sub(1)?).map(|m| m.id.clone())
}

fn print_history(chat: &ChatOrchestrator) {
    let messages = chat.messages();
    if messages.is_empty() {
        println!("(empty conversation)");
    }
    for (index, message) in messages.iter().enumerate() {
        println!("{}", history_line(index + 1, message, chat.config()));
    }
}
