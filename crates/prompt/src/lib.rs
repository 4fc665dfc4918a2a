//! # Talewright Prompt
//!
//! Turns a scene log into a prompt that fits the model's context window,
//! and runs a scene turn against the inference and memory backends.
//!
//! ```text
//! SharedMessageStore ─snapshot─► PromptComposer ─► FocalRequest ─► Outcome
//!                                  │    │    │
//!                           lookup ┘    │    └ placement
//!                                    history
//! ```
//!
//! - [`context`]: lookup, history selection, guidance placement, composition
//! - [`kind`]: response budgets and presets per generation kind
//! - [`system`]: system messages per generation kind
//! - [`coercion`]: prefill markers, repetition hints, stop strings
//! - [`turn`]: the async end-to-end pipeline

pub mod coercion;
pub mod context;
pub mod kind;
pub mod system;
pub mod turn;

pub use context::{
    HistoryRequest, HistorySelection, HistorySelector, Insertion, Placement, PromptComposer,
    RenderInput, RenderMetadata, RenderSignal, RenderedPrompt,
};
pub use kind::{make_kind, max_tokens_for_kind, preset_for_kind};
pub use system::SystemPrompts;
pub use turn::{SceneTurn, TurnRequest, TurnResult};
