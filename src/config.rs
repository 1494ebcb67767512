use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7010
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Language-model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name (only "anthropic" is built in)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Default output token cap per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Retries for transient provider failures (network, 429, 5xx)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_api_key_env() -> String {
    "HELPDESK_ANTHROPIC_API_KEY".to_string()
}

fn default_max_retries() -> usize {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
            max_retries: default_max_retries(),
        }
    }
}

/// Workflow action settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Listing cap when the model asks for tickets without a limit
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
    /// Listing cap for the REST and CLI ticket listings
    #[serde(default = "default_direct_list_limit")]
    pub direct_list_limit: usize,
    /// Where users are sent when a workflow action cannot be completed
    #[serde(default = "default_helpdesk_contact")]
    pub helpdesk_contact: String,
}

fn default_list_limit() -> usize {
    5
}

fn default_direct_list_limit() -> usize {
    10
}

fn default_helpdesk_contact() -> String {
    "the IT helpdesk at helpdesk@company.com or ext. 4357".to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            list_limit: default_list_limit(),
            direct_list_limit: default_direct_list_limit(),
            helpdesk_contact: default_helpdesk_contact(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Characters of the message kept in escalation ticket titles
    #[serde(default = "default_title_chars")]
    pub title_chars: usize,
}

fn default_title_chars() -> usize {
    40
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            title_chars: default_title_chars(),
        }
    }
}

/// Metrics tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Number of events retained (oldest evicted first)
    #[serde(default = "default_metrics_capacity")]
    pub capacity: usize,
    /// Raw events returned alongside summaries
    #[serde(default = "default_recent_events")]
    pub recent_events: usize,
    /// Summary window when the caller does not give one
    #[serde(default = "default_window_secs")]
    pub default_window_secs: u64,
}

fn default_metrics_capacity() -> usize {
    1000
}

fn default_recent_events() -> usize {
    20
}

fn default_window_secs() -> u64 {
    3600 // 1 hour
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            capacity: default_metrics_capacity(),
            recent_events: default_recent_events(),
            default_window_secs: default_window_secs(),
        }
    }
}

/// Knowledge retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Documents scoring below this are not returned
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
}

fn default_top_k() -> usize {
    3
}

fn default_min_similarity() -> f32 {
    0.1
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_similarity: default_min_similarity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// State directory (tickets file, logs)
    #[serde(default = "default_state_path")]
    pub state: String,
    /// Directory of knowledge documents (*.md, *.txt)
    #[serde(default = "default_knowledge_path")]
    pub knowledge: String,
}

fn default_state_path() -> String {
    ".helpdesk".to_string()
}

fn default_knowledge_path() -> String {
    ".helpdesk/knowledge".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state: default_state_path(),
            knowledge: default_knowledge_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether the server logs to a file (false = stderr)
    #[serde(default = "default_log_to_file")]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_to_file() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: default_log_to_file(),
        }
    }
}

impl Config {
    /// Path to the project-local config file
    pub fn local_config_path() -> PathBuf {
        PathBuf::from(".helpdesk/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so the service works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let local_config = Self::local_config_path();
        if local_config.exists() {
            builder = builder.add_source(config::File::from(local_config));
        }

        // User config in ~/.config/helpdesk/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("helpdesk").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables with HELPDESK_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("HELPDESK")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to .helpdesk/config.toml
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::local_config_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_str =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(config_path, toml_str).context("Failed to write config file")?;

        Ok(())
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        absolute(&self.paths.state)
    }

    /// Get path to the persisted tickets file
    pub fn tickets_file(&self) -> PathBuf {
        self.state_path().join("tickets.json")
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }

    /// Get absolute path to the knowledge documents directory
    pub fn knowledge_path(&self) -> PathBuf {
        absolute(&self.paths.knowledge)
    }
}

fn absolute(path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            workflow: WorkflowConfig::default(),
            escalation: EscalationConfig::default(),
            metrics: MetricsConfig::default(),
            knowledge: KnowledgeConfig::default(),
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
