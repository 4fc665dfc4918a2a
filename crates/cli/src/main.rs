//! Talewright CLI: the main entry point.
//!
//! Commands:
//! - `render`    : Render a scene file into a prompt
//! - `parse`     : Parse a model reply against a callback file
//! - `callbacks` : Print the instruction block for a callback file
//! - `config`    : Initialize, show or validate configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod scene;

#[derive(Parser)]
#[command(
    name = "talewright",
    about = "Talewright: budget-aware prompts and function calling for interactive fiction",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.talewright/config.toml
    #[arg(long, global = true, env = "TALEWRIGHT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a scene file into a prompt
    Render {
        /// Scene file (JSON)
        #[arg(short, long)]
        scene: PathBuf,

        /// Character being prompted
        #[arg(short, long)]
        character: Option<String>,

        /// Callback file (TOML or JSON) whose instruction block joins the task
        #[arg(long)]
        callbacks: Option<PathBuf>,

        /// Recall extra memory from a JSON-lines file
        #[arg(long)]
        memory_file: Option<PathBuf>,

        /// Generation kind; prints its system message and response budget
        #[arg(short, long)]
        kind: Option<String>,

        /// Also print render metadata as JSON
        #[arg(long)]
        metadata: bool,
    },

    /// Parse a model reply against a callback file
    Parse {
        /// Callback file (TOML or JSON)
        #[arg(long)]
        callbacks: PathBuf,

        /// Reply file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        reply: String,
    },

    /// Print the instruction block for a callback file
    Callbacks {
        /// Callback file (TOML or JSON)
        #[arg(long)]
        callbacks: PathBuf,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init,
    /// Print the effective configuration
    Show,
    /// Check the configuration for errors
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries prompts and JSON.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Render {
            scene,
            character,
            callbacks,
            memory_file,
            kind,
            metadata,
        } => {
            commands::render::run(
                config_path,
                commands::render::RenderArgs {
                    scene,
                    character,
                    callbacks,
                    memory_file,
                    kind,
                    metadata,
                },
            )
            .await?
        }
        Commands::Parse { callbacks, reply } => commands::parse::run(&callbacks, &reply).await?,
        Commands::Callbacks { callbacks } => commands::callbacks::run(&callbacks).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init => commands::config_cmd::init(config_path).await?,
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
        },
    }

    Ok(())
}
