//! Memory retrieval backends for Talewright.

pub mod in_memory;
pub mod noop;

pub use in_memory::{InMemoryRetriever, MemoryEntry};
pub use noop::NoopRetriever;
