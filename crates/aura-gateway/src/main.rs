//! aura-gateway: process bootstrap and CLI
//!
//! Usage:
//!   aura-gateway                    - Start interactive CLI mode
//!   aura-gateway --once "<query>"   - Run a single turn and exit
//!   aura-gateway --help             - Show help

mod cli;
mod error;

use std::sync::Arc;
use std::time::Duration;

use aura_core::agents::{SubAgentRunner, builtin_subagents, reserved_tool_names};
use aura_core::config::OracleRole;
use aura_core::retrieval::{HttpRetriever, NoopRetriever, Retriever};
use aura_core::{
    Config, ConversationManager, CustomToolRunner, DelegateOracle, Dispatcher, LlmClient, RetryPolicy,
    RetryingOracle, Router, SqliteToolRegistry, TurnRunner,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_USER: &str = "local";

/// Run mode
#[derive(Debug, PartialEq)]
enum RunMode {
    /// Interactive CLI mode
    Interactive,
    /// One turn, answer on stdout
    Once(String),
    /// Show help
    Help,
    /// Show version
    Version,
}

#[derive(Debug, PartialEq)]
struct CliArgs {
    mode: RunMode,
    thread_id: Option<String>,
    user_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1)).map_err(|e| anyhow::anyhow!(e))?;

    match args.mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("aura-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting aura-gateway...");
    tracing::info!("Provider: {:?}, default model: {}", config.llm.provider, config.llm.model);

    let services = build_services(&config)?;

    match args.mode {
        RunMode::Once(query) => cli::run_once(&services, args.thread_id, &args.user_id, &query).await,
        _ => cli::run_cli(&services, args.thread_id, args.user_id).await,
    }
}

/// Parse command line arguments
fn parse_args<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = RunMode::Interactive;
    let mut thread_id = None;
    let mut user_id = DEFAULT_USER.to_string();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(CliArgs { mode: RunMode::Help, thread_id, user_id }),
            "--version" | "-v" => return Ok(CliArgs { mode: RunMode::Version, thread_id, user_id }),
            "--once" | "-o" => {
                let query = args.next().ok_or("--once requires a query")?;
                mode = RunMode::Once(query);
            }
            "--thread" | "-t" => {
                thread_id = Some(args.next().ok_or("--thread requires a thread id")?);
            }
            "--user" | "-u" => {
                user_id = args.next().ok_or("--user requires a user id")?;
            }
            other => return Err(format!("unknown argument: {} (see --help)", other)),
        }
    }

    Ok(CliArgs { mode, thread_id, user_id })
}

/// Print help message
fn print_help() {
    println!("aura-gateway - multi-agent orchestration CLI");
    println!();
    println!("Usage:");
    println!("  aura-gateway                     Start interactive CLI mode");
    println!("  aura-gateway --once \"<query>\"    Run one turn and print the answer");
    println!("  aura-gateway --thread <id>       Continue an existing thread");
    println!("  aura-gateway --user <id>         Act as this user (default: {})", DEFAULT_USER);
    println!("  aura-gateway --help              Show this help message");
    println!("  aura-gateway --version           Show version");
    println!();
    println!("Configuration is read from ./aura.toml when present.");
    println!();
    println!("Environment Variables:");
    println!("  LLM_API_KEY              API key (required)");
    println!("  LLM_MODEL                Default model for every role");
    println!("  LLM_PROVIDER             Provider: claude or openai (default: claude)");
    println!("  LLM_BASE_URL             Custom API endpoint");
    println!("  ORCHESTRATOR_MODEL       Model for routing");
    println!("  SUBAGENT_MODEL           Model for sub-agents");
    println!("  EXTRACTOR_MODEL          Model for custom-tool parameter extraction");
    println!("  ORCHESTRATOR_MAX_CYCLES  Routing cycles per turn (default: 5)");
    println!("  TOOL_HTTP_TIMEOUT_SECS   Custom tool request timeout (default: 15)");
    println!("  RETRIEVAL_ENDPOINT       Document search service base URL");
    println!("  RETRIEVAL_LIMIT          Excerpts per search (default: 5)");
    println!("  DB_PATH                  SQLite database (default: data/aura.db)");
}

/// Oracle for one role, with bounded retries
fn role_oracle(config: &Config, role: OracleRole) -> anyhow::Result<Arc<dyn DelegateOracle>> {
    let client = LlmClient::for_role(&config.llm, role)
        .map_err(|e| anyhow::anyhow!("Failed to create LLM client: {}", e))?;
    tracing::info!("{:?} oracle uses model {}", role, client.model());

    let policy = RetryPolicy {
        max_attempts: config.orchestrator.oracle_max_attempts,
        attempt_timeout: Duration::from_secs(config.llm.timeout_secs),
        backoff: Duration::from_millis(config.orchestrator.oracle_retry_backoff_ms),
    };
    Ok(Arc::new(RetryingOracle::new(client, policy)))
}

/// Wire oracles, stores and runners together
fn build_services(config: &Config) -> anyhow::Result<cli::Services> {
    let orchestrator_oracle = role_oracle(config, OracleRole::Orchestrator)?;
    let subagent_oracle = role_oracle(config, OracleRole::SubAgent)?;
    let extractor_oracle = role_oracle(config, OracleRole::Extractor)?;

    let retriever: Arc<dyn Retriever> = match &config.retrieval.endpoint {
        Some(endpoint) => {
            tracing::info!("Document retrieval via {}", endpoint);
            Arc::new(HttpRetriever::new(
                endpoint,
                Duration::from_secs(config.retrieval.timeout_secs),
            )?)
        }
        None => {
            tracing::warn!("RETRIEVAL_ENDPOINT not set; sub-agents will find no documents");
            Arc::new(NoopRetriever)
        }
    };

    let registry = Arc::new(
        SqliteToolRegistry::new(&config.memory.db_path)
            .map_err(|e| anyhow::anyhow!("Failed to open tool registry: {}", e))?
            .with_reserved_names(reserved_tool_names()),
    );
    let conversations = Arc::new(
        ConversationManager::new(&config.memory.db_path)
            .map_err(|e| anyhow::anyhow!("Failed to open conversation store: {}", e))?,
    );

    let dispatcher = Dispatcher::new(
        SubAgentRunner::new(subagent_oracle, retriever, config.retrieval.limit),
        CustomToolRunner::new(extractor_oracle, Duration::from_secs(config.tools.http_timeout_secs))?,
    );
    let router = Router::new(orchestrator_oracle, dispatcher, &config.orchestrator);
    let turns = TurnRunner::new(conversations, registry.clone(), builtin_subagents(), router);

    tracing::info!("aura-gateway initialized (database: {})", config.memory.db_path);
    Ok(cli::Services { turns, registry })
}
