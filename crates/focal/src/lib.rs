//! Focal: a constrained function-calling surface for text models.
//!
//! Agent logic declares the callbacks a model may invoke. The registry
//! renders them as an instruction block and parses the model's free-text
//! reply back into at most one validated, typed invocation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ render ┌─────────────┐ reply ┌──────────────┐
//! │  Callback    │───────▶│   Model     │──────▶│   Parser     │
//! │  Registry    │        │ (external)  │       │              │
//! └──────────────┘        └─────────────┘       └──────┬───────┘
//!                                                     │
//!                                               ┌─────┴──────┐
//!                                               │  Outcome   │
//!                                               │ NoAction   │
//!                                               │ Invocation │
//!                                               │ ParseFail  │
//!                                               └────────────┘
//! ```
//!
//! # Example Declaration
//!
//! ```toml
//! [[callbacks]]
//! name = "revise"
//! description = "Rewrite the last line of dialogue"
//!
//! [[callbacks.parameters]]
//! name = "text"
//! type = "str"
//! description = "The revised line"
//!
//! [[callbacks.examples]]
//! text = "She sets the cup down without a word."
//! ```

mod cycle;
mod outcome;
mod parser;
mod registry;
mod request;
mod schema;

pub use cycle::{CycleState, FocalCycle};
pub use outcome::{ArgValue, FailureKind, Invocation, Outcome, ParseFailure};
pub use registry::{CallbackRegistry, render_call};
pub use request::{FocalRequest, request};
pub use schema::{CallbackSchema, Example, NO_ACTION, ParamType, Parameter};

/// Re-export for convenience.
pub type FocalResult<T> = std::result::Result<T, FocalError>;

/// Errors in callback declarations or cycle usage. Model replies never
/// produce these; they produce [`Outcome::ParseFailure`].
#[derive(Debug, thiserror::Error)]
pub enum FocalError {
    #[error("callback '{name}' is already registered")]
    DuplicateCallback { name: String },

    #[error("invalid callback '{name}': {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("invalid example for callback '{name}': {reason}")]
    InvalidExample { name: String, reason: String },

    #[error("cannot {action} a cycle in state '{from}'")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<FocalError> for talewright_core::Error {
    fn from(err: FocalError) -> Self {
        talewright_core::Error::Internal(err.to_string())
    }
}
