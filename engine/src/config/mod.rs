//! Configuration management
//!
//! Configuration is stored in TOML format at ~/.brain/config.toml and is
//! created with defaults on first use.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory, tool workspace
//! - **llm**: Commander (Anthropic) and local Ollama model settings
//! - **guard**: Per-turn tool-call guard limits
//! - **budget**: Per-turn compute quotas and the two-strikes limit
//! - **cache**: Result cache capacity and backing file
//! - **swarm**: Hive file, concurrency and timeouts for swarm rounds
//! - **worker**: Worker model options and prompt windows
//!
//! Every field has a default, so a partial file (or an empty one) loads.
//!
//! # Path Expansion
//!
//! A leading `~` is expanded to the user's home directory. The workspace is
//! created if missing and canonicalized. Empty `cache.file` / `swarm.hive_file`
//! resolve to files inside `core.data_dir`.
//!
//! # Examples
//!
//! ```no_run
//! use brain_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Workspace: {:?}", config.core.workspace);
//! println!("Guard ceiling: {}", config.guard.max_tool_calls);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent::AgentSettings;
use crate::control::{BudgetLimits, GuardLimits};
use crate::llm::ollama::GenerationOptions;
use crate::llm::RetryPolicy;
use crate::swarm::{PromptWindows, SwarmSettings};

const CACHE_FILE_NAME: &str = "tool_cache.json";
const HIVE_FILE_NAME: &str = "hive_memory.json";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub llm: LLMConfig,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub swarm: SwarmConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Core engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Logging level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where the cache and hive files live
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root directory the file tools may touch
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
}

/// Model backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Hosted model that drives the commander loop
    #[serde(default)]
    pub commander: CommanderConfig,

    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    /// Local model for tool execution
    #[serde(default = "default_executor_model")]
    pub executor_model: String,

    /// Local model behind `deep_think`
    #[serde(default = "default_thinker_model")]
    pub thinker_model: String,

    /// Local model for swarm workers
    #[serde(default = "default_worker_model")]
    pub worker_model: String,

    /// HTTP timeout for local model requests
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts per commander call, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Anthropic messages API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommanderConfig {
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    #[serde(default = "default_anthropic_model")]
    pub model: String,

    #[serde(default = "default_commander_max_tokens")]
    pub max_tokens: u32,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_commander_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Estimated USD per 1000 tokens, for usage reports
    #[serde(default = "default_cost_per_1k_tokens")]
    pub cost_per_1k_tokens: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_guard_max_tool_calls")]
    pub max_tool_calls: usize,

    #[serde(default = "default_max_consecutive_same_tool")]
    pub max_consecutive_same_tool: usize,

    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_budget_max_tool_calls")]
    pub max_tool_calls: u32,

    #[serde(default = "default_max_thinker_calls")]
    pub max_thinker_calls: u32,

    #[serde(default = "default_max_api_calls")]
    pub max_api_calls: u32,

    /// Tools that also count against the thinker quota
    #[serde(default = "default_thinker_tools")]
    pub thinker_tools: Vec<String>,

    /// Tools that also count against the api quota
    #[serde(default)]
    pub api_tools: Vec<String>,

    #[serde(default = "default_strike_limit")]
    pub strike_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Defaults to `<data_dir>/tool_cache.json`
    #[serde(default)]
    pub file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Defaults to `<data_dir>/hive_memory.json`
    #[serde(default)]
    pub hive_file: PathBuf,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,

    #[serde(default = "default_round_timeout_secs")]
    pub round_timeout_secs: u64,

    #[serde(default = "default_round_pause_ms")]
    pub round_pause_ms: u64,

    #[serde(default = "default_agents")]
    pub default_agents: usize,

    #[serde(default = "default_rounds")]
    pub default_rounds: u32,

    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Per attempt; a worker makes at most two
    #[serde(default = "default_worker_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_worker_temperature")]
    pub temperature: f32,

    #[serde(default = "default_worker_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_discovery_window")]
    pub discovery_window: usize,

    #[serde(default = "default_solution_window")]
    pub solution_window: usize,

    #[serde(default = "default_error_window")]
    pub error_window: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.brain/data")
}

fn default_workspace() -> PathBuf {
    PathBuf::from("~/.brain/workspace")
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_executor_model() -> String {
    "qwen2.5-coder:7b".to_string()
}

fn default_thinker_model() -> String {
    "deepseek-r1:8b".to_string()
}

fn default_worker_model() -> String {
    "qwen2.5:0.5b".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_commander_max_tokens() -> u32 {
    4096
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_commander_timeout_secs() -> u64 {
    120
}

fn default_cost_per_1k_tokens() -> f64 {
    0.009
}

fn default_guard_max_tool_calls() -> usize {
    12
}

fn default_max_consecutive_same_tool() -> usize {
    3
}

fn default_recent_window() -> usize {
    5
}

fn default_budget_max_tool_calls() -> u32 {
    15
}

fn default_max_thinker_calls() -> u32 {
    3
}

fn default_max_api_calls() -> u32 {
    5
}

fn default_thinker_tools() -> Vec<String> {
    vec!["deep_think".to_string()]
}

fn default_strike_limit() -> u32 {
    2
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_max_concurrency() -> usize {
    12
}

fn default_agent_timeout_secs() -> u64 {
    15
}

fn default_round_timeout_secs() -> u64 {
    90
}

fn default_round_pause_ms() -> u64 {
    300
}

fn default_agents() -> usize {
    50
}

fn default_rounds() -> u32 {
    2
}

fn default_max_agents() -> usize {
    200
}

fn default_worker_timeout_secs() -> u64 {
    7
}

fn default_worker_temperature() -> f32 {
    0.3
}

fn default_worker_max_tokens() -> u32 {
    256
}

fn default_discovery_window() -> usize {
    5
}

fn default_solution_window() -> usize {
    3
}

fn default_error_window() -> usize {
    3
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            workspace: default_workspace(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            commander: CommanderConfig::default(),
            ollama_base_url: default_ollama_base_url(),
            executor_model: default_executor_model(),
            thinker_model: default_thinker_model(),
            worker_model: default_worker_model(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for CommanderConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
            max_tokens: default_commander_max_tokens(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_commander_timeout_secs(),
            cost_per_1k_tokens: default_cost_per_1k_tokens(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: default_guard_max_tool_calls(),
            max_consecutive_same_tool: default_max_consecutive_same_tool(),
            recent_window: default_recent_window(),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: default_budget_max_tool_calls(),
            max_thinker_calls: default_max_thinker_calls(),
            max_api_calls: default_max_api_calls(),
            thinker_tools: default_thinker_tools(),
            api_tools: Vec::new(),
            strike_limit: default_strike_limit(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            file: PathBuf::new(),
        }
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            hive_file: PathBuf::new(),
            max_concurrency: default_max_concurrency(),
            agent_timeout_secs: default_agent_timeout_secs(),
            round_timeout_secs: default_round_timeout_secs(),
            round_pause_ms: default_round_pause_ms(),
            default_agents: default_agents(),
            default_rounds: default_rounds(),
            max_agents: default_max_agents(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_worker_timeout_secs(),
            temperature: default_worker_temperature(),
            max_tokens: default_worker_max_tokens(),
            discovery_window: default_discovery_window(),
            solution_window: default_solution_window(),
            error_window: default_error_window(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.brain/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))
    }

    fn create_default(path: &Path) -> Result<Self, EngineError> {
        // Saved before processing so the file keeps `~` paths
        let mut config = Self::default();
        config.save(path)?;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.brain/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".brain").join("config.toml"))
    }

    /// Validate limits, expand paths and create the directories they name
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The log level is unknown
    /// - A capacity, ceiling or quota that must be positive is zero
    /// - Path expansion or directory creation fails
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let positive = [
            ("guard.max_tool_calls", self.guard.max_tool_calls),
            (
                "guard.max_consecutive_same_tool",
                self.guard.max_consecutive_same_tool,
            ),
            ("guard.recent_window", self.guard.recent_window),
            ("budget.max_tool_calls", self.budget.max_tool_calls as usize),
            ("budget.strike_limit", self.budget.strike_limit as usize),
            ("cache.capacity", self.cache.capacity),
            ("swarm.max_concurrency", self.swarm.max_concurrency),
            ("swarm.max_agents", self.swarm.max_agents),
            ("llm.max_retries", self.llm.max_retries as usize),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(EngineError::Config(format!("{} must be at least 1", name)));
        }

        if self.swarm.agent_timeout_secs == 0 || self.swarm.round_timeout_secs == 0 {
            return Err(EngineError::Config(
                "swarm timeouts must be at least 1 second".to_string(),
            ));
        }
        if self.worker.timeout_secs == 0 {
            return Err(EngineError::Config(
                "worker.timeout_secs must be at least 1".to_string(),
            ));
        }

        self.core.workspace = expand_path(&self.core.workspace)?;
        self.core.workspace = canonicalize_or_create(&self.core.workspace)?;
        if !self.core.workspace.is_dir() {
            return Err(EngineError::Config(format!(
                "Workspace path is not a directory: {:?}",
                self.core.workspace
            )));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        self.cache.file = self.data_file(&self.cache.file, CACHE_FILE_NAME)?;
        self.swarm.hive_file = self.data_file(&self.swarm.hive_file, HIVE_FILE_NAME)?;

        Ok(())
    }

    fn data_file(&self, configured: &Path, default_name: &str) -> Result<PathBuf, EngineError> {
        if configured.as_os_str().is_empty() {
            Ok(self.core.data_dir.join(default_name))
        } else {
            expand_path(configured)
        }
    }

    pub fn guard_limits(&self) -> GuardLimits {
        GuardLimits {
            max_calls: self.guard.max_tool_calls,
            max_consecutive: self.guard.max_consecutive_same_tool,
            recent_window: self.guard.recent_window,
        }
    }

    pub fn budget_limits(&self) -> BudgetLimits {
        BudgetLimits {
            max_tool_calls: self.budget.max_tool_calls,
            max_thinker_calls: self.budget.max_thinker_calls,
            max_api_calls: self.budget.max_api_calls,
            strike_limit: self.budget.strike_limit,
            thinker_tools: self.budget.thinker_tools.clone(),
            api_tools: self.budget.api_tools.clone(),
        }
    }

    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            guard: self.guard_limits(),
            budget: self.budget_limits(),
            retry: RetryPolicy {
                max_attempts: self.llm.max_retries,
                ..RetryPolicy::commander()
            },
            ..AgentSettings::default()
        }
    }

    pub fn swarm_settings(&self) -> SwarmSettings {
        SwarmSettings {
            max_concurrency: self.swarm.max_concurrency,
            agent_timeout: Duration::from_secs(self.swarm.agent_timeout_secs),
            round_timeout: Duration::from_secs(self.swarm.round_timeout_secs),
            round_pause: Duration::from_millis(self.swarm.round_pause_ms),
        }
    }

    pub fn prompt_windows(&self) -> PromptWindows {
        PromptWindows {
            discoveries: self.worker.discovery_window,
            solutions: self.worker.solution_window,
            errors: self.worker.error_window,
        }
    }

    pub fn worker_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: Some(self.worker.temperature),
            num_predict: Some(self.worker.max_tokens),
        }
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.request_timeout_secs)
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Canonicalize path, creating it if it doesn't exist
fn canonicalize_or_create(path: &Path) -> Result<PathBuf, EngineError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            EngineError::Config(format!("Failed to create directory {:?}: {}", path, e))
        })?;
    }

    path.canonicalize()
        .map_err(|e| EngineError::Config(format!("Failed to resolve {:?}: {}", path, e)))
}
