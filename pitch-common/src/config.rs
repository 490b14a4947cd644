//! Configuration management for Pitchmate services.
//!
//! Services share one configuration file at `~/.pitchmate/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `PITCHMATE_BIND_ADDRESS` → network.bind
//! - `PITCHMATE_PORT` → network.port
//! - `PITCHMATE_JWT_SECRET` / `SUPABASE_JWT_SECRET` → auth.jwt_secret
//! - `PITCHMATE_LOG_LEVEL` → observability.log_level
//! - `PITCHMATE_MODEL` → agent.default_model
//! - `GOOGLE_API_KEY` / `GEMINI_API_KEY` → secrets.google_api_key
//! - `DATABASE_URL` → storage.database_url
//! - `ARTIFACTS_ROOT_DIR` → storage.artifacts_root_dir
//!
//! Per-agent model overrides are read at lookup time from `{AGENT_NAME}_MODEL`,
//! see [`AgentConfig::model_for_agent`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".pitchmate"),
        |dirs| dirs.home_dir().join(".pitchmate"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Listener configuration for the gateway.
///
/// Default bind is `127.0.0.1` (local only). Set to `0.0.0.0` for remote access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

// ============================================================================
// Auth Configuration
// ============================================================================

/// Bearer-token authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// HS256 secret used to verify bearer tokens (e.g. the Supabase JWT secret).
    /// When unset, requests are admitted as the anonymous user.
    #[serde(default)]
    pub jwt_secret: Option<String>,
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Orchestrator agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Application name that scopes sessions
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Name of the orchestrator agent
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Model used when no per-agent override exists
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Per-agent model overrides (agent name → model)
    #[serde(default)]
    pub models: HashMap<String, String>,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: i64,

    /// Number of past invocations replayed to the model
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Extra attempts after a failed provider call
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Keywords that block a request before it reaches the model
    #[serde(default = "default_blocked_keywords")]
    pub blocked_keywords: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            agent_name: default_agent_name(),
            default_model: default_model(),
            models: HashMap::new(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            history_turns: default_history_turns(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            blocked_keywords: default_blocked_keywords(),
        }
    }
}

impl AgentConfig {
    /// Resolve the model for `agent_name`.
    ///
    /// Priority:
    /// 1. `{AGENT_NAME_UPPER}_MODEL` environment variable
    /// 2. `models[agent_name]`
    /// 3. `default_model`
    pub fn model_for_agent(&self, agent_name: &str) -> String {
        let env_key = format!("{}_MODEL", agent_name.to_uppercase());
        std::env::var(env_key)
            .ok()
            .filter(|m| !m.is_empty())
            .or_else(|| self.models.get(agent_name).cloned())
            .unwrap_or_else(|| self.default_model.clone())
    }
}

fn default_app_name() -> String {
    "pitchmate_app".into()
}

fn default_agent_name() -> String {
    "pitchmate_agent".into()
}

fn default_model() -> String {
    "gemini-2.5-flash".into()
}

fn default_temperature() -> f64 {
    0.3
}

fn default_max_output_tokens() -> i64 {
    8192
}

fn default_history_turns() -> usize {
    15
}

fn default_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_blocked_keywords() -> Vec<String> {
    vec!["BLOCK".into()]
}

// ============================================================================
// Storage Configuration
// ============================================================================

/// Session persistence and artifact locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database for agent sessions. In-memory sessions when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Directory generated documents are downloaded from
    #[serde(default = "default_artifacts_root_dir")]
    pub artifacts_root_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            artifacts_root_dir: default_artifacts_root_dir(),
        }
    }
}

impl StorageConfig {
    /// Filesystem path of the session database, accepting `sqlite://` URLs.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| {
                let path = url
                    .strip_prefix("sqlite://")
                    .or_else(|| url.strip_prefix("sqlite:"))
                    .unwrap_or(url);
                PathBuf::from(path)
            })
    }
}

fn default_artifacts_root_dir() -> String {
    "./artifacts".into()
}

// ============================================================================
// Secrets Configuration
// ============================================================================

/// LLM provider credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    #[serde(default)]
    pub google_api_key: Option<String>,
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to clamp to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration shared by Pitchmate services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides read through `lookup` instead of the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("PITCHMATE_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(port) = lookup("PITCHMATE_PORT") {
            match port.parse() {
                Ok(p) => self.network.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PITCHMATE_PORT"),
            }
        }

        if let Some(secret) = lookup("PITCHMATE_JWT_SECRET").or_else(|| lookup("SUPABASE_JWT_SECRET")) {
            self.auth.jwt_secret = Some(secret);
        }

        if let Some(level) = lookup("PITCHMATE_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Some(model) = lookup("PITCHMATE_MODEL") {
            self.agent.default_model = model;
        }

        if let Some(key) = lookup("GOOGLE_API_KEY").or_else(|| lookup("GEMINI_API_KEY")) {
            self.secrets.google_api_key = Some(key);
        }

        if let Some(url) = lookup("DATABASE_URL") {
            self.storage.database_url = Some(url);
        }
        if let Some(dir) = lookup("ARTIFACTS_ROOT_DIR") {
            self.storage.artifacts_root_dir = dir;
        }
    }
}
