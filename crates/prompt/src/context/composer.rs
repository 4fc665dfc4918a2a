//! Prompt composition: the orchestrator for one render.
//!
//! Assembles a scene prompt from fixed-order sections:
//!
//! 1. **CONTEXT** (character / scene background), fixed, never trimmed
//! 2. **MEMORY** (retrieved snippets), capped, latest-retrieved dropped first
//! 3. **TASK** (task statement + callback instruction block), fixed
//! 4. **GUIDANCE** (early), when the history is short
//! 5. **SCENE** (history), whatever budget remains, dialogue floor applies
//! 6. **GUIDANCE** (late), when the history is long
//! 7. Trailing scaffolding, verbatim
//!
//! # Determinism
//!
//! Rendering is synchronous and deterministic: identical inputs and an
//! unchanged snapshot always produce identical text. Nothing here reads the
//! clock or the live store.

use serde::Serialize;
use std::sync::Arc;
use talewright_config::PromptConfig;
use talewright_core::{HeuristicCounter, MessageSnapshot, TokenCounter};
use talewright_focal::CallbackRegistry;

use crate::context::history::{HistoryRequest, HistorySelector};
use crate::context::lookup;
use crate::context::placement::{self, Placement};

// ── Types ─────────────────────────────────────────────────────────────────

pub const SECTION_CONTEXT: &str = "CONTEXT";
pub const SECTION_MEMORY: &str = "MEMORY";
pub const SECTION_TASK: &str = "TASK";
pub const SECTION_GUIDANCE: &str = "GUIDANCE";
pub const SECTION_SCENE: &str = "SCENE";

/// Wrap `body` in section delimiters.
pub fn section(name: &str, body: &str) -> String {
    format!("<|SECTION:{name}|>\n{body}\n<|CLOSE_SECTION|>")
}

/// Everything one render needs. Collaborator content arrives pre-rendered.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    /// Consistent view of the scene log.
    pub messages: &'a MessageSnapshot,
    /// The character being prompted, if any.
    pub character: Option<&'a str>,
    pub context: &'a str,
    /// Retrieved memory snippets, most relevant first.
    pub memory: &'a [String],
    pub task: &'a str,
    pub callbacks: Option<&'a CallbackRegistry>,
    pub guidance: &'a [String],
    /// One-off line placed a few turns before the end of the history.
    pub acting_instruction: Option<&'a str>,
    pub scaffolding: &'a str,
}

impl<'a> RenderInput<'a> {
    pub fn new(messages: &'a MessageSnapshot) -> Self {
        Self {
            messages,
            character: None,
            context: "",
            memory: &[],
            task: "",
            callbacks: None,
            guidance: &[],
            acting_instruction: None,
            scaffolding: "",
        }
    }

    pub fn character(mut self, name: &'a str) -> Self {
        self.character = Some(name);
        self
    }

    pub fn context(mut self, text: &'a str) -> Self {
        self.context = text;
        self
    }

    pub fn memory(mut self, snippets: &'a [String]) -> Self {
        self.memory = snippets;
        self
    }

    pub fn task(mut self, text: &'a str) -> Self {
        self.task = text;
        self
    }

    pub fn callbacks(mut self, registry: &'a CallbackRegistry) -> Self {
        self.callbacks = Some(registry);
        self
    }

    pub fn guidance(mut self, parts: &'a [String]) -> Self {
        self.guidance = parts;
        self
    }

    pub fn acting_instruction(mut self, line: &'a str) -> Self {
        self.acting_instruction = Some(line);
        self
    }

    pub fn scaffolding(mut self, text: &'a str) -> Self {
        self.scaffolding = text;
        self
    }
}

/// The rendered prompt, ready for the inference call.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedPrompt {
    pub text: String,
    pub metadata: RenderMetadata,
}

/// Detailed metadata about one render.
#[derive(Debug, Clone, Serialize)]
pub struct RenderMetadata {
    /// `max_tokens` minus reserved headroom.
    pub budget: usize,
    /// Reserved headroom plus per-section delimiter overhead.
    pub overhead: usize,
    /// Exact token count of the final text.
    pub total_tokens: usize,
    /// Share of `max_tokens` used (0.0–100.0).
    pub utilization_pct: f32,
    pub sections: Vec<SectionStats>,
    pub history: HistoryStats,
    pub placement: Placement,
    pub signals: Vec<RenderSignal>,
}

impl RenderMetadata {
    pub fn section(&self, name: &str) -> Option<&SectionStats> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn has_signal(&self, signal: &RenderSignal) -> bool {
        self.signals.contains(signal)
    }
}

/// Statistics for a single emitted section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionStats {
    pub name: String,
    /// Tokens of the section body.
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryStats {
    pub lines: usize,
    pub dropped: usize,
    pub tokens: usize,
    pub budget: i64,
    pub inserted_at: Option<usize>,
}

/// Degraded-content signals. None of these is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum RenderSignal {
    /// A region had no budget left after the mandatory content.
    BudgetExhausted { region: String },
    /// The dialogue floor pushed the history past its budget.
    FloorOverride { dialogue: usize },
    /// The acting instruction's offset exceeded the selected history.
    InsertionSkipped { offset: usize },
}

// ── Composer ──────────────────────────────────────────────────────────────

/// The prompt composer. Stateless: create one and reuse it.
pub struct PromptComposer {
    config: PromptConfig,
    counter: Arc<dyn TokenCounter>,
}

impl PromptComposer {
    pub fn new(config: PromptConfig, counter: Arc<dyn TokenCounter>) -> Self {
        Self { config, counter }
    }

    /// A composer using the byte-length token estimate.
    pub fn with_heuristic(config: PromptConfig) -> Self {
        Self::new(config, Arc::new(HeuristicCounter))
    }

    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    /// Render a prompt.
    ///
    /// # Algorithm
    ///
    /// 1. Budget = `max_tokens - reserved_headroom`
    /// 2. Charge fixed content: context, task, guidance, scaffolding
    /// 3. Fit memory snippets into `min(memory_budget, remaining)`
    /// 4. Select history with what remains, minus the acting instruction
    /// 5. Place guidance by measured history length
    /// 6. Concatenate sections in fixed order
    pub fn render(&self, input: &RenderInput<'_>) -> RenderedPrompt {
        let cfg = &self.config;
        let per_section = cfg.section_overhead as i64;
        let budget = cfg.max_tokens.saturating_sub(cfg.reserved_headroom);
        let mut remaining = budget as i64;
        let mut stats: Vec<SectionStats> = Vec::new();
        let mut signals: Vec<RenderSignal> = Vec::new();

        // ── Fixed content ──────────────────────────────────────────────────
        let context = non_empty(input.context.trim());
        if let Some(text) = &context {
            let tokens = self.counter.count(text);
            remaining -= tokens as i64 + per_section;
            stats.push(SectionStats::single(SECTION_CONTEXT, tokens));
        }

        let task = compose_task(input.task, input.callbacks);
        if let Some(text) = &task {
            let tokens = self.counter.count(text);
            remaining -= tokens as i64 + per_section;
            stats.push(SectionStats::single(SECTION_TASK, tokens));
        }

        let directive = input
            .character
            .and_then(|name| lookup::last_director_for(input.messages, name, cfg.lookup_max_scan));
        let mut guidance_parts: Vec<String> = input.guidance.to_vec();
        if let Some(message) = directive {
            guidance_parts.push(message.render_line());
        }
        let mut guidance = placement::merge_guidance(&guidance_parts);
        if let Some(text) = &guidance {
            remaining -= self.counter.count(text) as i64 + per_section;
            stats.push(self.guidance_stats(text, &guidance_parts));
        }

        remaining -= self.counter.count(input.scaffolding) as i64;

        if remaining <= 0 {
            tracing::warn!(budget, remaining, "Fixed content exhausts the prompt budget");
            signals.push(RenderSignal::BudgetExhausted {
                region: "fixed".into(),
            });
        }

        // ── Memory ─────────────────────────────────────────────────────────
        let memory_cap = (cfg.memory_budget as i64).min(remaining - per_section);
        let memory = self.fit_memory(input.memory, memory_cap);
        if let Some((text, included)) = &memory {
            let tokens = self.counter.count(text);
            remaining -= tokens as i64 + per_section;
            stats.push(SectionStats {
                name: SECTION_MEMORY.into(),
                tokens,
                items_included: *included,
                items_total: input.memory.len(),
            });
        } else if !input.memory.is_empty() {
            signals.push(RenderSignal::BudgetExhausted {
                region: "memory".into(),
            });
        }

        // ── History ────────────────────────────────────────────────────────
        let acting = input.acting_instruction.and_then(|l| non_empty(l.trim()));
        let acting_tokens = acting.as_deref().map_or(0, |l| self.counter.count(l)) as i64;
        let history_budget = remaining - per_section - acting_tokens;
        if history_budget <= 0 {
            signals.push(RenderSignal::BudgetExhausted {
                region: "history".into(),
            });
        }

        let mut request = HistoryRequest::new(history_budget)
            .min_dialogue(cfg.min_dialogue)
            .strip_sections(cfg.strip_sections);
        if let Some(name) = input.character {
            request = request.retain_speaker(name);
        }
        if let Some(line) = &acting {
            request = request.insert(cfg.actor_instructions_offset, line.clone());
        }
        let selection = HistorySelector::new(self.counter.as_ref()).select(input.messages, &request);

        if selection.floor_override {
            signals.push(RenderSignal::FloorOverride {
                dialogue: selection.dialogue_count(input.messages),
            });
        }
        if acting.is_some() && selection.inserted.is_none() {
            signals.push(RenderSignal::InsertionSkipped {
                offset: cfg.actor_instructions_offset,
            });
        }

        // The directive is shown once: the history copy wins when it survived.
        if let Some(message) = directive.filter(|m| selection.indices.contains(&m.index)) {
            guidance_parts.pop();
            guidance = placement::merge_guidance(&guidance_parts);
            if let Some(at) = stats.iter().position(|s| s.name == SECTION_GUIDANCE) {
                match &guidance {
                    Some(text) => stats[at] = self.guidance_stats(text, &guidance_parts),
                    None => {
                        stats.remove(at);
                    }
                }
            }
            tracing::debug!(index = message.index, "Director instruction kept in history only");
        }

        let history_text = selection.text();
        if !selection.is_empty() {
            stats.push(SectionStats {
                name: SECTION_SCENE.into(),
                tokens: selection.tokens,
                items_included: selection.indices.len(),
                items_total: selection.indices.len() + selection.dropped,
            });
        }

        // ── Placement ──────────────────────────────────────────────────────
        let placed = placement::place_guidance(
            &history_text,
            guidance.as_slice(),
            cfg.large_context_threshold,
            self.counter.as_ref(),
        );

        // ── Concatenate ────────────────────────────────────────────────────
        let mut parts: Vec<String> = Vec::new();
        if let Some(text) = &context {
            parts.push(section(SECTION_CONTEXT, text));
        }
        if let Some((text, _)) = &memory {
            parts.push(section(SECTION_MEMORY, text));
        }
        if let Some(text) = &task {
            parts.push(section(SECTION_TASK, text));
        }
        if let Some(text) = &placed.early {
            parts.push(section(SECTION_GUIDANCE, text));
        }
        if !selection.is_empty() {
            parts.push(section(SECTION_SCENE, &history_text));
        }
        if let Some(text) = &placed.late {
            parts.push(section(SECTION_GUIDANCE, text));
        }
        let emitted = parts.len();
        if !input.scaffolding.is_empty() {
            parts.push(input.scaffolding.to_string());
        }
        let text = parts.join("\n\n");

        let total_tokens = self.counter.count(&text);
        let utilization_pct = if cfg.max_tokens == 0 {
            0.0
        } else {
            (total_tokens as f32 / cfg.max_tokens as f32) * 100.0
        };

        tracing::debug!(
            total_tokens,
            budget,
            sections = emitted,
            history_lines = selection.indices.len(),
            placement = ?placed.placement,
            signals = signals.len(),
            "Rendered prompt"
        );

        RenderedPrompt {
            text,
            metadata: RenderMetadata {
                budget,
                overhead: cfg.reserved_headroom + cfg.section_overhead * emitted,
                total_tokens,
                utilization_pct,
                sections: stats,
                history: HistoryStats {
                    lines: selection.indices.len(),
                    dropped: selection.dropped,
                    tokens: selection.tokens,
                    budget: history_budget,
                    inserted_at: selection.inserted,
                },
                placement: placed.placement,
                signals,
            },
        }
    }

    fn guidance_stats(&self, text: &str, parts: &[String]) -> SectionStats {
        SectionStats {
            name: SECTION_GUIDANCE.into(),
            tokens: self.counter.count(text),
            items_included: parts.iter().filter(|p| !p.trim().is_empty()).count(),
            items_total: parts.len(),
        }
    }

    /// Keep a prefix of `snippets` whose joined text fits `cap`.
    fn fit_memory(&self, snippets: &[String], cap: i64) -> Option<(String, usize)> {
        let cap = usize::try_from(cap).ok().filter(|&c| c > 0)?;
        let mut kept: Vec<&str> = Vec::new();
        let mut used = 0;
        for snippet in snippets.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let tokens = self.counter.count(snippet);
            if used + tokens > cap {
                break;
            }
            used += tokens;
            kept.push(snippet);
        }
        while !kept.is_empty() && self.counter.count(&kept.join("\n")) > cap {
            kept.pop();
        }
        if kept.len() < snippets.len() {
            tracing::debug!(
                kept = kept.len(),
                total = snippets.len(),
                cap,
                "Trimmed retrieved memory"
            );
        }
        (!kept.is_empty()).then(|| (kept.join("\n"), kept.len()))
    }
}

impl SectionStats {
    fn single(name: &str, tokens: usize) -> Self {
        Self {
            name: name.into(),
            tokens,
            items_included: 1,
            items_total: 1,
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

fn compose_task(task: &str, callbacks: Option<&CallbackRegistry>) -> Option<String> {
    let block = callbacks.map(CallbackRegistry::render);
    match (non_empty(task.trim()), block) {
        (Some(task), Some(block)) => Some(format!("{task}\n\n{block}")),
        (Some(task), None) => Some(task),
        (None, block) => block,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
