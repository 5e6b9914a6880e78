//! CLI (Command Line Interface) mode
//!
//! Interactive REPL over the turn runner, plus the one-shot `--once` mode.

use std::path::Path;
use std::sync::Arc;

use aura_core::tool::ToolKind;
use aura_core::{CustomToolDefinition, SqliteToolRegistry, TurnOutcome, TurnRunner, TurnStatus};
use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, Emacs, KeyCode, KeyModifiers, Keybindings, MenuBuilder, Prompt,
    Reedline, ReedlineEvent, ReedlineMenu, Signal, Suggestion,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::error::{GatewayError, Result};

/// Available commands for autocomplete display
const COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show help"),
    ("/exit", "Quit"),
    ("/new", "Start a new thread"),
    ("/history", "Show the current thread's messages"),
    ("/threads", "List your threads"),
    ("/tools", "List available tools"),
    ("/register", "Register a custom tool from a JSON file"),
    ("/unregister", "Remove a custom tool"),
];

/// Everything the CLI drives
pub struct Services {
    pub turns: TurnRunner,
    pub registry: Arc<SqliteToolRegistry>,
}

/// Parsed slash command
#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Exit,
    New,
    History,
    Threads,
    Tools,
    Register(String),
    Unregister(String),
    Unknown(String),
}

impl Command {
    /// `Ok(None)` when the input is a query rather than a command
    fn parse(input: &str) -> Result<Option<Self>> {
        if !input.starts_with('/') {
            return Ok(None);
        }
        let (head, rest) = match input.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (input, ""),
        };

        let command = match head.to_lowercase().as_str() {
            "/help" | "/?" => Self::Help,
            "/exit" | "/quit" | "/q" => Self::Exit,
            "/new" => Self::New,
            "/history" => Self::History,
            "/threads" => Self::Threads,
            "/tools" => Self::Tools,
            "/register" if rest.is_empty() => {
                return Err(GatewayError::Usage("/register <file.json>".into()));
            }
            "/register" => Self::Register(rest.to_string()),
            "/unregister" if rest.is_empty() => {
                return Err(GatewayError::Usage("/unregister <name>".into()));
            }
            "/unregister" => Self::Unregister(rest.to_string()),
            _ => Self::Unknown(input.to_string()),
        };
        Ok(Some(command))
    }
}

/// Command completer for reedline
#[derive(Clone)]
pub struct CommandCompleter {
    commands: Vec<(&'static str, &'static str)>,
}

impl CommandCompleter {
    pub fn new() -> Self {
        Self {
            commands: COMMANDS.to_vec(),
        }
    }
}

impl Default for CommandCompleter {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if !line.starts_with('/') {
            return Vec::new();
        }

        self.commands
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: reedline::Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

/// Prompt showing a short form of the current thread id
struct ThreadPrompt {
    style: Style,
    label: String,
}

impl ThreadPrompt {
    fn new(thread_id: &str) -> Self {
        Self {
            style: Color::Cyan.bold(),
            label: format!("[{}] > ", thread_id.chars().take(8).collect::<String>()),
        }
    }
}

impl Prompt for ThreadPrompt {
    fn render_prompt_left(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.style.paint(&self.label).to_string())
    }

    fn render_prompt_right(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: reedline::PromptHistorySearch,
    ) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }
}

/// Where the REPL currently is
///
/// The thread id is fixed before the first turn so a cancelled or failed
/// turn is picked up again by the next message.
struct CliSession {
    thread_id: String,
    user_id: String,
}

impl CliSession {
    fn new(thread_id: Option<String>, user_id: String) -> Self {
        Self {
            thread_id: thread_id.unwrap_or_else(new_thread_id),
            user_id,
        }
    }

    fn start_new_thread(&mut self) {
        self.thread_id = new_thread_id();
    }
}

fn new_thread_id() -> String {
    Uuid::new_v4().to_string()
}

/// Run CLI interactive mode
pub async fn run_cli(services: &Services, thread_id: Option<String>, user_id: String) -> anyhow::Result<()> {
    let mut session = CliSession::new(thread_id, user_id);
    info!("Starting CLI mode for user {}", session.user_id);

    print_welcome();

    let mut keybindings = default_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );

    let menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_menu")
            .with_columns(1)
            .with_column_width(Some(40))
            .with_only_buffer_difference(false),
    );
    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());

    let mut line_editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter::new()))
        .with_menu(ReedlineMenu::EngineCompleter(menu))
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    loop {
        let prompt = ThreadPrompt::new(&session.thread_id);

        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                match Command::parse(input) {
                    Ok(Some(Command::Exit)) => {
                        println!("\nGoodbye!\n");
                        break;
                    }
                    Ok(Some(command)) => {
                        if let Err(e) = handle_command(command, services, &mut session).await {
                            eprintln!("\n{} {}\n", Color::Red.paint("Error:"), e);
                        }
                    }
                    Ok(None) => {
                        match run_interruptible(&services.turns, &session, input).await {
                            Ok(outcome) => print_outcome(&outcome),
                            Err(aura_core::Error::Cancelled) => {
                                println!("\n^C (turn cancelled; it resumes on the next message)\n");
                            }
                            Err(e) => eprintln!("\n{} {}\n", Color::Red.paint("Error:"), e),
                        }
                    }
                    Err(e) => eprintln!("\n{}\n", e),
                }
            }
            Ok(Signal::CtrlC) => {
                println!("^C");
                continue;
            }
            Ok(Signal::CtrlD) => {
                println!("\nGoodbye!\n");
                break;
            }
            Err(err) => {
                eprintln!("\n{} {}\n", Color::Red.paint("Error:"), err);
                break;
            }
        }
    }

    Ok(())
}

/// Run one turn and print the answer
pub async fn run_once(
    services: &Services,
    thread_id: Option<String>,
    user_id: &str,
    query: &str,
) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        anyhow::bail!("query is empty");
    }

    let thread_id = thread_id.unwrap_or_else(new_thread_id);
    let outcome = match services.turns.run_turn(Some(thread_id.clone()), user_id, query).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("thread: {}", thread_id);
            return Err(e.into());
        }
    };
    println!("{}", outcome.answer_text);
    if !outcome.sources.is_empty() {
        println!("\nSources: {}", outcome.sources.join(", "));
    }
    eprintln!("thread: {}", outcome.thread_id);
    Ok(())
}

/// Run a turn that Ctrl-C cancels
async fn run_interruptible(
    turns: &TurnRunner,
    session: &CliSession,
    query: &str,
) -> aura_core::Result<TurnOutcome> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = turns
        .run_turn_with_cancel(Some(session.thread_id.clone()), &session.user_id, query, cancel)
        .await;
    watcher.abort();
    result
}

/// Default keybindings for reedline
fn default_keybindings() -> Keybindings {
    let mut keybindings = Keybindings::new();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Esc, ReedlineEvent::Esc);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('c'), ReedlineEvent::CtrlC);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::CtrlD);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Up, ReedlineEvent::Up);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Down, ReedlineEvent::Down);
    keybindings
}

async fn handle_command(command: Command, services: &Services, session: &mut CliSession) -> Result<()> {
    match command {
        Command::Help => print_help(),
        Command::Exit => {}
        Command::New => {
            session.start_new_thread();
            println!("\nStarted thread {}.\n", session.thread_id);
        }
        Command::History => print_history(services, &session.thread_id).await?,
        Command::Threads => print_threads(services, session).await?,
        Command::Tools => print_tools(services).await?,
        Command::Register(path) => {
            let definition = read_definition(Path::new(&path))?;
            let descriptor = services.registry.register(definition)?;
            println!("\nRegistered tool '{}'.\n", descriptor.name);
        }
        Command::Unregister(name) => {
            if services.registry.remove(&name)? {
                println!("\nRemoved tool '{}'.\n", name);
            } else {
                println!("\nNo custom tool named '{}'.\n", name);
            }
        }
        Command::Unknown(input) => {
            eprintln!("\nUnknown command: {}. Type /help for the command list.\n", input);
        }
    }
    Ok(())
}

fn read_definition(path: &Path) -> Result<CustomToolDefinition> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn print_outcome(outcome: &TurnOutcome) {
    println!("\n{}", outcome.answer_text);
    if !outcome.sources.is_empty() {
        println!("{}", Style::new().dimmed().paint(format!("Sources: {}", outcome.sources.join(", "))));
    }
    if outcome.status == TurnStatus::Degraded {
        println!("{}", Color::Yellow.paint("(partial answer)"));
    }
    println!();
}

/// Print welcome message
fn print_welcome() {
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║          aura-gateway CLI - interactive mode               ║");
    println!("╠════════════════════════════════════════════════════════════╣");
    println!("║  Type a message and press Enter to ask                     ║");
    println!("║  Commands: /help, /new, /threads, /tools, /exit            ║");
    println!("║  Type / to see command suggestions                         ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
}

/// Print help message
fn print_help() {
    println!();
    println!("Available commands:");
    for (cmd, desc) in COMMANDS {
        println!("  {} - {}", cmd, desc);
    }
    println!();
    println!("Ctrl-C while a turn runs cancels it; the turn resumes on your next message.");
    println!();
}

async fn print_history(services: &Services, thread_id: &str) -> Result<()> {
    let records = services.turns.conversations().list_message_records(thread_id).await?;

    println!();
    println!("Thread {} ({} messages):", thread_id, records.len());
    println!("{}", "─".repeat(50));
    for record in &records {
        let message = &record.message;
        let label = match &message.name {
            Some(name) => format!("{}:{}", message.role.as_str(), name),
            None => message.role.as_str().to_string(),
        };
        let preview: String = message.content.chars().take(100).collect();
        let tools: Vec<&str> = message.tool_calls.iter().map(|c| c.name.as_str()).collect();
        if tools.is_empty() {
            println!("{}. {}: {}", record.seq, label, preview.replace('\n', " "));
        } else {
            println!("{}. {}: [calls {}] {}", record.seq, label, tools.join(", "), preview.replace('\n', " "));
        }
    }
    println!("{}", "─".repeat(50));
    println!();
    Ok(())
}

async fn print_threads(services: &Services, session: &CliSession) -> Result<()> {
    let threads = services.turns.conversations().list_threads(&session.user_id).await?;

    println!();
    if threads.is_empty() {
        println!("No threads for user {}.", session.user_id);
    }
    for thread in &threads {
        let marker = if session.thread_id == thread.thread_id { "*" } else { " " };
        println!(
            "{} {}  {}  {}",
            marker,
            thread.thread_id,
            thread.updated_at.format("%Y-%m-%d %H:%M"),
            thread.title
        );
    }
    println!();
    Ok(())
}

async fn print_tools(services: &Services) -> Result<()> {
    let catalog = services.turns.load_catalog().await?;

    println!();
    println!("Available tools ({}):", catalog.len());
    for descriptor in catalog.descriptors() {
        let kind = match descriptor.kind() {
            ToolKind::SubAgent => "agent",
            ToolKind::ExternalApi => "api",
        };
        println!("  {:<28} [{}] {}", descriptor.name, kind, descriptor.description);
    }
    println!();
    Ok(())
}
