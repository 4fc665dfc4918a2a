//! Subcommand implementations and the helpers they share.

pub mod callbacks;
pub mod config_cmd;
pub mod parse;
pub mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use talewright_config::AppConfig;
use talewright_core::TokenCounter;
use talewright_focal::CallbackRegistry;

/// Load configuration from `path`, or from the default location with
/// environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}

pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load a callback file; `.json` files are JSON, everything else TOML.
pub fn load_registry(path: &Path) -> Result<CallbackRegistry, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read callback file {}: {e}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let registry = if is_json {
        CallbackRegistry::from_json(&content)?
    } else {
        CallbackRegistry::from_toml(&content)?
    };
    tracing::debug!(path = %path.display(), callbacks = registry.len(), "Callback file loaded");
    Ok(registry)
}

/// The token counter for this build.
#[cfg(feature = "tiktoken")]
pub fn counter() -> Result<Arc<dyn TokenCounter>, Box<dyn std::error::Error>> {
    Ok(Arc::new(talewright_core::TiktokenCounter::cl100k()?))
}

/// The token counter for this build.
#[cfg(not(feature = "tiktoken"))]
pub fn counter() -> Result<Arc<dyn TokenCounter>, Box<dyn std::error::Error>> {
    Ok(Arc::new(talewright_core::HeuristicCounter))
}
