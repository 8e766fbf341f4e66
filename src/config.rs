use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub logseq: LogseqConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Connection settings for Logseq's local API server
#[derive(Debug, Clone, Deserialize)]
pub struct LogseqConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Token configured under Settings > Features > API server in Logseq.
    /// May be left empty in the file when LOGSEQ_API_TOKEN is set.
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Per-operation strategy switches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub use_datalog: DatalogSwitch,
}

/// `use_datalog = true` or `[features.use_datalog] concept_network = false`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DatalogSwitch {
    All(bool),
    PerOperation(HashMap<String, bool>),
}

impl Default for DatalogSwitch {
    fn default() -> Self {
        DatalogSwitch::All(true)
    }
}

impl FeatureFlags {
    /// Whether `operation` should run its Datalog-backed variant.
    /// Operations missing from a per-operation table default to Datalog.
    pub fn use_datalog_for(&self, operation: &str) -> bool {
        match &self.use_datalog {
            DatalogSwitch::All(enabled) => *enabled,
            DatalogSwitch::PerOperation(map) => map.get(operation).copied().unwrap_or(true),
        }
    }
}

/// Size caps for topic context bundles
#[derive(Debug, Clone, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_blocks")]
    pub max_blocks: usize,
    #[serde(default = "default_max_related_pages")]
    pub max_related_pages: usize,
    #[serde(default = "default_max_references")]
    pub max_references: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_blocks: default_max_blocks(),
            max_related_pages: default_max_related_pages(),
            max_references: default_max_references(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_http_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub authless: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            api_key_env: default_http_api_key_env(),
            allowed_origins: default_allowed_origins(),
            authless: false,
        }
    }
}

fn default_api_url() -> String {
    "http://127.0.0.1:12315".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_blocks() -> usize {
    50
}

fn default_max_related_pages() -> usize {
    10
}

fn default_max_references() -> usize {
    20
}

fn default_http_port() -> u16 {
    8080
}

fn default_http_api_key_env() -> String {
    "LOGSEQ_MCP_API_KEY".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![]
}

/// Environment variable that overrides `logseq.auth_token`
pub const TOKEN_ENV: &str = "LOGSEQ_API_TOKEN";

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "LOGSEQ_MCP_CONFIG";

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in LOGSEQ_MCP_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.logseq.auth_token = token;
            }
        }

        config.validate()?;

        Ok(config)
    }

    /// Build a configuration in code with default features and limits
    pub fn from_parts(api_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            logseq: LogseqConfig {
                api_url: api_url.into(),
                auth_token: auth_token.into(),
                timeout_secs: default_timeout_secs(),
            },
            features: FeatureFlags::default(),
            context: ContextConfig::default(),
            http_server: HttpServerConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.logseq.auth_token.trim().is_empty() {
            anyhow::bail!(
                "logseq.auth_token is empty. Set it in config.toml or export {} with the token from Logseq's API server settings.",
                TOKEN_ENV
            );
        }

        let url = url::Url::parse(&self.logseq.api_url)
            .with_context(|| format!("logseq.api_url is not a valid URL: {}", self.logseq.api_url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("logseq.api_url must use http or https, got {}", url.scheme());
        }

        if self.context.max_blocks == 0
            || self.context.max_related_pages == 0
            || self.context.max_references == 0
        {
            anyhow::bail!("context limits must be greater than 0");
        }

        Ok(())
    }
}
