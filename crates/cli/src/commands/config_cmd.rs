//! `talewright config`: Configuration management commands.

use std::path::Path;
use talewright_config::AppConfig;

pub async fn init(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::config_path(path);

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete it and re-run `talewright config init`.");
        return Ok(());
    }

    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config at: {}", config_path.display());
    Ok(())
}

pub async fn validate(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match super::load_config(path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let prompt = &config.prompt;
            let mut warnings = Vec::new();

            if prompt.memory_budget >= prompt.max_tokens.saturating_sub(prompt.reserved_headroom) {
                warnings.push("memory_budget leaves no room for history");
            }
            if prompt.min_dialogue == 0 {
                warnings.push("min_dialogue = 0: history may be dropped entirely on tight budgets");
            }
            if prompt.lookup_max_scan.is_none() {
                warnings.push("lookup_max_scan unset: director lookups scan the whole scene");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Budget:     {} ({} reserved)", prompt.max_tokens, prompt.reserved_headroom);
            println!("   Dialogue:   at least {} lines", prompt.min_dialogue);
            println!("   Memory:     {} tokens", prompt.memory_budget);
            println!("   Timeout:    {}s", config.inference.timeout_secs);
            println!("   Retries:    {}", config.inference.parse_retries);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e);
        }
    }

    Ok(())
}

pub async fn show(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(path).map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub async fn path(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", super::config_path(path).display());
    Ok(())
}
