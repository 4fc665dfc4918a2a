//! # Talewright Core
//!
//! Domain types, traits, and error definitions for the Talewright prompt
//! engine. This crate carries no prompt logic of its own; it defines the
//! scene log, the token-counting contract, and the two external
//! collaborators (inference and memory retrieval) that every other crate
//! builds against.
//!
//! ## Design Philosophy
//!
//! Collaborators outside the engine are traits here. Implementations live in
//! their respective crates (or in the host application). This enables:
//! - Swapping tokenizers and backends via configuration
//! - Easy testing with scripted stand-ins
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod inference;
pub mod message;
pub mod retrieval;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ExternalCallError, Result, StoreError};
pub use inference::{Inference, InferenceRequest};
pub use message::{
    MessageKind, MessageSnapshot, MessageStore, NewMessage, SceneId, SceneMessage,
    SharedMessageStore,
};
pub use retrieval::{RetrievalQuery, Retriever};
pub use token::{HeuristicCounter, TokenCounter};

#[cfg(feature = "tiktoken")]
pub use token::TiktokenCounter;
