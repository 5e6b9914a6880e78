//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `aura.toml` in the working directory
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the TOML file is expanded from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Error;

/// LLM Provider type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic Claude API
    #[default]
    Claude,
    /// OpenAI-compatible API (OpenRouter, OpenAI, etc.)
    OpenAi,
}

impl LlmProvider {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "openai" | "openrouter" | "glm" | "compatible" => Self::OpenAi,
            _ => Self::Claude,
        }
    }
}

/// Which part of the system an oracle serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleRole {
    Orchestrator,
    SubAgent,
    Extractor,
}

/// Per-role model overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleModels {
    pub orchestrator: Option<String>,
    pub subagent: Option<String>,
    pub extractor: Option<String>,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key
    pub api_key: String,

    /// Default model for every role
    #[serde(default = "default_model")]
    pub model: String,

    /// API provider
    #[serde(default)]
    pub provider: LlmProvider,

    /// Base URL (optional, for custom endpoints)
    pub base_url: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Completion budget per oracle call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,

    #[serde(default)]
    pub roles: RoleModels,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            provider: LlmProvider::Claude,
            base_url: None,
            timeout_secs: default_llm_timeout(),
            max_tokens: default_max_tokens(),
            roles: RoleModels::default(),
        }
    }
}

impl LlmConfig {
    /// Model used for a given oracle role
    pub fn model_for(&self, role: OracleRole) -> &str {
        let role_model = match role {
            OracleRole::Orchestrator => self.roles.orchestrator.as_deref(),
            OracleRole::SubAgent => self.roles.subagent.as_deref(),
            OracleRole::Extractor => self.roles.extractor.as_deref(),
        };
        role_model.filter(|m| !m.is_empty()).unwrap_or(&self.model)
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_max_tokens() -> u64 {
    2048
}

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Routing/Dispatching cycles allowed per turn
    pub max_cycles: usize,
    /// Attempts per oracle call before giving up
    pub oracle_max_attempts: u32,
    /// Backoff between oracle attempts (multiplied by attempt number)
    pub oracle_retry_backoff_ms: u64,
    /// Tool calls of one batch executed at the same time
    pub max_concurrent_dispatches: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_cycles: 5,
            oracle_max_attempts: 3,
            oracle_retry_backoff_ms: 250,
            max_concurrent_dispatches: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Timeout for a single external API request
    pub http_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL of the search service; `None` disables retrieval
    pub endpoint: Option<String>,
    /// Excerpts requested per search
    pub limit: usize,
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            limit: 5,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "data/aura.db".to_string()
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Config {
    /// Expand `${VAR_NAME}` occurrences from the environment.
    ///
    /// Unknown variables expand to the empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                while let Some(c) = chars.next() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let expanded_content = Self::expand_env_vars(&toml_content);

        let config: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        let mut cfg = Self::from_toml_config(config);
        cfg.apply_env_overrides();
        cfg.validate()?;

        Ok(cfg)
    }

    /// Load from `./aura.toml` when present, otherwise from the environment
    pub fn load() -> crate::Result<Self> {
        if Path::new("aura.toml").exists() {
            return Self::from_toml_file("aura.toml");
        }

        Self::from_env()
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        if cfg.llm.api_key.is_empty() {
            return Err(Error::Config("LLM_API_KEY not set".to_string()));
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let defaults = Self::default();

        let llm = toml.llm.unwrap_or_default();
        let roles = llm.roles.unwrap_or_default();
        let llm_config = LlmConfig {
            api_key: llm.api_key.unwrap_or_default(),
            model: llm.model.unwrap_or_else(default_model),
            provider: llm
                .provider
                .as_deref()
                .map(LlmProvider::parse)
                .unwrap_or_default(),
            base_url: llm.base_url,
            timeout_secs: llm.timeout_secs.unwrap_or_else(default_llm_timeout),
            max_tokens: llm.max_tokens.unwrap_or_else(default_max_tokens),
            roles: RoleModels {
                orchestrator: roles.orchestrator,
                subagent: roles.subagent,
                extractor: roles.extractor,
            },
        };

        let orch = toml.orchestrator.unwrap_or_default();
        let orchestrator = OrchestratorConfig {
            max_cycles: orch.max_cycles.unwrap_or(defaults.orchestrator.max_cycles),
            oracle_max_attempts: orch
                .oracle_max_attempts
                .unwrap_or(defaults.orchestrator.oracle_max_attempts),
            oracle_retry_backoff_ms: orch
                .oracle_retry_backoff_ms
                .unwrap_or(defaults.orchestrator.oracle_retry_backoff_ms),
            max_concurrent_dispatches: orch
                .max_concurrent_dispatches
                .unwrap_or(defaults.orchestrator.max_concurrent_dispatches),
        };

        let tools = toml.tools.unwrap_or_default();
        let retrieval = toml.retrieval.unwrap_or_default();
        let memory = toml.memory.unwrap_or_default();

        Config {
            llm: llm_config,
            orchestrator,
            tools: ToolsConfig {
                http_timeout_secs: tools
                    .http_timeout_secs
                    .unwrap_or(defaults.tools.http_timeout_secs),
            },
            retrieval: RetrievalConfig {
                endpoint: retrieval.endpoint.filter(|e| !e.is_empty()),
                limit: retrieval.limit.unwrap_or(defaults.retrieval.limit),
                timeout_secs: retrieval
                    .timeout_secs
                    .unwrap_or(defaults.retrieval.timeout_secs),
            },
            memory: MemoryConfig {
                db_path: memory.db_path.unwrap_or_else(default_db_path),
            },
        }
    }

    /// Environment variables take precedence over the file
    fn apply_env_overrides(&mut self) {
        if let Some(api_key) = non_empty_var("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Some(model) = non_empty_var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(provider) = non_empty_var("LLM_PROVIDER") {
            self.llm.provider = LlmProvider::parse(&provider);
        }
        if let Some(base_url) = non_empty_var("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }

        if let Some(model) = non_empty_var("ORCHESTRATOR_MODEL") {
            self.llm.roles.orchestrator = Some(model);
        }
        if let Some(model) = non_empty_var("SUBAGENT_MODEL") {
            self.llm.roles.subagent = Some(model);
        }
        if let Some(model) = non_empty_var("EXTRACTOR_MODEL") {
            self.llm.roles.extractor = Some(model);
        }

        if let Some(cycles) = non_empty_var("ORCHESTRATOR_MAX_CYCLES").and_then(|v| v.parse().ok()) {
            self.orchestrator.max_cycles = cycles;
        }
        if let Some(secs) = non_empty_var("TOOL_HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.tools.http_timeout_secs = secs;
        }

        if let Some(endpoint) = non_empty_var("RETRIEVAL_ENDPOINT") {
            self.retrieval.endpoint = Some(endpoint);
        }
        if let Some(limit) = non_empty_var("RETRIEVAL_LIMIT").and_then(|v| v.parse().ok()) {
            self.retrieval.limit = limit;
        }

        if let Some(path) = non_empty_var("DB_PATH") {
            self.memory.db_path = path;
        }
    }

    fn validate(&self) -> crate::Result<()> {
        if self.orchestrator.max_cycles == 0 {
            return Err(Error::Config("orchestrator.max_cycles must be at least 1".into()));
        }
        if self.orchestrator.oracle_max_attempts == 0 {
            return Err(Error::Config(
                "orchestrator.oracle_max_attempts must be at least 1".into(),
            ));
        }
        if self.orchestrator.max_concurrent_dispatches == 0 {
            return Err(Error::Config(
                "orchestrator.max_concurrent_dispatches must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ============================================================================
// TOML file layout
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    llm: Option<TomlLlmConfig>,
    orchestrator: Option<TomlOrchestratorConfig>,
    tools: Option<TomlToolsConfig>,
    retrieval: Option<TomlRetrievalConfig>,
    memory: Option<TomlMemoryConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlLlmConfig {
    /// "claude" or "openai"
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    max_tokens: Option<u64>,
    #[serde(default)]
    roles: Option<TomlRoleModels>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlRoleModels {
    orchestrator: Option<String>,
    subagent: Option<String>,
    extractor: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlOrchestratorConfig {
    max_cycles: Option<usize>,
    oracle_max_attempts: Option<u32>,
    oracle_retry_backoff_ms: Option<u64>,
    max_concurrent_dispatches: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlToolsConfig {
    http_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlRetrievalConfig {
    endpoint: Option<String>,
    limit: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlMemoryConfig {
    db_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_config_default() {
        let config = LlmConfig::default();
        assert_eq!(config.model, "claude-sonnet-4-20250514");
        assert_eq!(config.provider, LlmProvider::Claude);
        assert!(config.api_key.is_empty());
        assert!(config.base_url.is_none());
    }

    #[test]
    fn test_orchestrator_config_default() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_cycles, 5);
        assert_eq!(config.oracle_max_attempts, 3);
        assert_eq!(config.max_concurrent_dispatches, 4);
    }

    #[test]
    fn test_memory_config_default() {
        let config = MemoryConfig::default();
        assert_eq!(config.db_path, "data/aura.db");
    }

    #[test]
    fn test_model_for_role() {
        let mut config = LlmConfig::default();
        config.model = "base-model".into();
        config.roles.extractor = Some("extractor-model".into());
        config.roles.subagent = Some(String::new());

        assert_eq!(config.model_for(OracleRole::Extractor), "extractor-model");
        assert_eq!(config.model_for(OracleRole::Orchestrator), "base-model");
        assert_eq!(config.model_for(OracleRole::SubAgent), "base-model");
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(LlmProvider::parse("OpenRouter"), LlmProvider::OpenAi);
        assert_eq!(LlmProvider::parse("openai"), LlmProvider::OpenAi);
        assert_eq!(LlmProvider::parse("claude"), LlmProvider::Claude);
        assert_eq!(LlmProvider::parse("anything"), LlmProvider::Claude);
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("AURA_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${AURA_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        let result = Config::expand_env_vars("prefix_${AURA_NONEXISTENT_VAR}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("AURA_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        assert_eq!(Config::expand_env_vars("no_vars_here"), "no_vars_here");
        assert_eq!(Config::expand_env_vars("${}_content"), "_content");
    }

    #[test]
    fn test_toml_config_parsing() {
        let toml_content = r#"
[llm]
provider = "openai"
model = "openai/gpt-4o-mini"
api_key = "test_key"
base_url = "https://openrouter.ai/api/v1"

[llm.roles]
extractor = "google/gemini-1.5-pro"

[orchestrator]
max_cycles = 3

[tools]
http_timeout_secs = 5

[retrieval]
endpoint = "http://localhost:8000"
limit = 8

[memory]
db_path = "/path/to/db"
"#;

        let toml_config: TomlConfig = toml::from_str(toml_content).unwrap();
        let config = Config::from_toml_config(toml_config);

        assert_eq!(config.llm.provider, LlmProvider::OpenAi);
        assert_eq!(config.llm.model, "openai/gpt-4o-mini");
        assert_eq!(config.llm.model_for(OracleRole::Extractor), "google/gemini-1.5-pro");
        assert_eq!(config.orchestrator.max_cycles, 3);
        assert_eq!(config.orchestrator.oracle_max_attempts, 3);
        assert_eq!(config.tools.http_timeout_secs, 5);
        assert_eq!(config.retrieval.endpoint.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.retrieval.limit, 8);
        assert_eq!(config.retrieval.timeout_secs, 10);
        assert_eq!(config.memory.db_path, "/path/to/db");
    }

    #[test]
    fn test_from_toml_file_rejects_zero_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aura.toml");
        std::fs::write(&path, "[llm]\napi_key = \"k\"\n\n[orchestrator]\nmax_cycles = 0\n").unwrap();

        let result = Config::from_toml_file(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
