//! Configuration loading, validation, and management for Talewright.
//!
//! Loads configuration from `~/.talewright/config.toml` with environment
//! variable overrides. Validates all settings at load time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.talewright/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Prompt assembly settings
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Inference call settings
    #[serde(default)]
    pub inference: InferenceConfig,

    /// System prompt settings
    #[serde(default)]
    pub system_prompts: SystemPromptConfig,
}

/// Budget and placement knobs for prompt rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Total token ceiling for a rendered prompt
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Headroom subtracted from `max_tokens` before anything is rendered
    #[serde(default = "default_reserved_headroom")]
    pub reserved_headroom: usize,

    /// Tokens charged per emitted section for its delimiters
    #[serde(default = "default_section_overhead")]
    pub section_overhead: usize,

    /// Dialogue messages kept in history even when the budget is exhausted
    #[serde(default = "default_min_dialogue")]
    pub min_dialogue: usize,

    /// History length (tokens) at which guidance moves after the history
    #[serde(default = "default_large_context_threshold")]
    pub large_context_threshold: usize,

    /// How many lines before the end of history the acting instruction goes
    #[serde(default = "default_actor_instructions_offset")]
    pub actor_instructions_offset: usize,

    /// Remove `<|SECTION:..|>` markers from history lines
    #[serde(default = "default_true")]
    pub strip_sections: bool,

    /// Ceiling for the retrieved-memory region
    #[serde(default = "default_memory_budget")]
    pub memory_budget: usize,

    /// Candidates inspected by backward message lookups (`None` = unbounded)
    #[serde(default = "default_lookup_max_scan")]
    pub lookup_max_scan: Option<usize>,
}

fn default_max_tokens() -> usize {
    8192
}
fn default_reserved_headroom() -> usize {
    512
}
fn default_section_overhead() -> usize {
    8
}
fn default_min_dialogue() -> usize {
    15
}
fn default_large_context_threshold() -> usize {
    1024
}
fn default_actor_instructions_offset() -> usize {
    3
}
fn default_memory_budget() -> usize {
    1024
}
fn default_lookup_max_scan() -> Option<usize> {
    Some(64)
}
fn default_true() -> bool {
    true
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            reserved_headroom: default_reserved_headroom(),
            section_overhead: default_section_overhead(),
            min_dialogue: default_min_dialogue(),
            large_context_threshold: default_large_context_threshold(),
            actor_instructions_offset: default_actor_instructions_offset(),
            strip_sections: true,
            memory_budget: default_memory_budget(),
            lookup_max_scan: default_lookup_max_scan(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Timeout for a single inference or retrieval call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts after an unparsable reply
    #[serde(default = "default_parse_retries")]
    pub parse_retries: u32,
}

fn default_timeout_secs() -> u64 {
    120
}
fn default_parse_retries() -> u32 {
    1
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            parse_retries: default_parse_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPromptConfig {
    /// Allow mature content in system prompts
    #[serde(default = "default_true")]
    pub decensor: bool,

    /// Per-kind replacements for the built-in system prompts
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, String>,
}

impl Default for SystemPromptConfig {
    fn default() -> Self {
        Self {
            decensor: true,
            overrides: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.talewright/config.toml).
    ///
    /// Environment variables override file values:
    /// - `TALEWRIGHT_MAX_TOKENS`
    /// - `TALEWRIGHT_MIN_DIALOGUE`
    /// - `TALEWRIGHT_LARGE_CONTEXT_THRESHOLD`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let parse = |key: &str| -> Result<Option<usize>, ConfigError> {
            match lookup(key) {
                Some(raw) => raw.trim().parse::<usize>().map(Some).map_err(|_| {
                    ConfigError::ValidationError(format!(
                        "{key} must be a non-negative integer, got '{raw}'"
                    ))
                }),
                None => Ok(None),
            }
        };

        if let Some(v) = parse("TALEWRIGHT_MAX_TOKENS")? {
            self.prompt.max_tokens = v;
        }
        if let Some(v) = parse("TALEWRIGHT_MIN_DIALOGUE")? {
            self.prompt.min_dialogue = v;
        }
        if let Some(v) = parse("TALEWRIGHT_LARGE_CONTEXT_THRESHOLD")? {
            self.prompt.large_context_threshold = v;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".talewright")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prompt.max_tokens <= self.prompt.reserved_headroom {
            return Err(ConfigError::ValidationError(format!(
                "prompt.max_tokens ({}) must exceed prompt.reserved_headroom ({})",
                self.prompt.max_tokens, self.prompt.reserved_headroom
            )));
        }

        if self.prompt.large_context_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "prompt.large_context_threshold must be > 0".into(),
            ));
        }

        if self.prompt.actor_instructions_offset > 1000 {
            return Err(ConfigError::ValidationError(
                "prompt.actor_instructions_offset must be <= 1000".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for talewright_core::Error {
    fn from(err: ConfigError) -> Self {
        talewright_core::Error::Config {
            message: err.to_string(),
        }
    }
}
