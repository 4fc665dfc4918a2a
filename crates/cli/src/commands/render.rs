//! `talewright render`: Render a scene file into a prompt.

use std::path::{Path, PathBuf};
use talewright_core::{RetrievalQuery, Retriever};
use talewright_memory::InMemoryRetriever;
use talewright_prompt::context::last_dialogue;
use talewright_prompt::{
    PromptComposer, RenderInput, SystemPrompts, max_tokens_for_kind, preset_for_kind,
};

use crate::scene::SceneFile;

pub struct RenderArgs {
    pub scene: PathBuf,
    pub character: Option<String>,
    pub callbacks: Option<PathBuf>,
    pub memory_file: Option<PathBuf>,
    pub kind: Option<String>,
    pub metadata: bool,
}

pub async fn run(config_path: Option<&Path>, args: RenderArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let scene = SceneFile::load(&args.scene)?;
    let registry = args.callbacks.as_deref().map(super::load_registry).transpose()?;
    let counter = super::counter()?;

    let store = scene.store();
    let messages = store.snapshot();

    let mut memory = scene.memory.clone();
    if let Some(path) = &args.memory_file {
        let retriever = InMemoryRetriever::load_jsonl(path)
            .map_err(|e| format!("Failed to read memory file {}: {e}", path.display()))?
            .with_counter(counter.clone());
        if let Some(latest) = last_dialogue(&messages, config.prompt.lookup_max_scan) {
            let query = RetrievalQuery::new(latest.render_line(), config.prompt.memory_budget);
            let recalled = retriever.retrieve(&query).await?;
            tracing::debug!(count = recalled.len(), "Recalled memory from file");
            memory.extend(recalled);
        }
    }

    let mut input = RenderInput::new(&messages)
        .context(&scene.context)
        .memory(&memory)
        .task(&scene.task)
        .guidance(&scene.guidance)
        .scaffolding(&scene.scaffolding);
    if let Some(name) = args.character.as_deref() {
        input = input.character(name);
    }
    if let Some(line) = scene.acting_instruction.as_deref() {
        input = input.acting_instruction(line);
    }
    if let Some(registry) = &registry {
        input = input.callbacks(registry);
    }

    let composer = PromptComposer::new(config.prompt.clone(), counter);
    let rendered = composer.render(&input);

    if let Some(kind) = args.kind.as_deref() {
        let system = SystemPrompts::from_config(&config.system_prompts)
            .get(kind, config.system_prompts.decensor);
        println!("── system ({kind}, preset {}) ──", preset_for_kind(kind));
        println!("{system}");
        println!(
            "── prompt (reply budget {} tokens) ──",
            max_tokens_for_kind(kind, config.prompt.max_tokens)
        );
    }
    println!("{}", rendered.text);

    if args.metadata {
        println!("── metadata ──");
        println!("{}", serde_json::to_string_pretty(&rendered.metadata)?);
    }

    Ok(())
}
