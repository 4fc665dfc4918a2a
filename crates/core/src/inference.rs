//! Inference trait: the abstraction over the text-generation backend.
//!
//! The engine treats generation as an opaque, single-shot call: prompt text
//! in, raw reply text out. Timeouts and cancellation are imposed by the
//! caller; any failure surfaces as [`ExternalCallError`] and aborts the
//! render cycle that issued it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExternalCallError;

/// A single generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// The fully rendered prompt
    pub prompt: String,

    /// System message for backends with a separate system turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// Generation kind (e.g. "conversation", "director"), used by backends
    /// to pick presets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl InferenceRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// The text-generation backend.
#[async_trait]
pub trait Inference: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Generate a reply for the request.
    async fn generate(&self, request: InferenceRequest) -> Result<String, ExternalCallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Inference for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, request: InferenceRequest) -> Result<String, ExternalCallError> {
            Ok(request.prompt)
        }
    }

    #[test]
    fn request_builder() {
        let req = InferenceRequest::new("prompt")
            .with_stop(vec!["Kai:".into()])
            .with_max_tokens(75)
            .with_kind("conversation");
        assert_eq!(req.stop, vec!["Kai:".to_string()]);
        assert_eq!(req.max_tokens, Some(75));
        assert_eq!(req.kind.as_deref(), Some("conversation"));
    }

    #[test]
    fn request_serialization_skips_empty() {
        let json = serde_json::to_string(&InferenceRequest::new("hi")).unwrap();
        assert_eq!(json, r#"{"prompt":"hi"}"#);
    }

    #[tokio::test]
    async fn trait_object_dispatch() {
        let backend: Box<dyn Inference> = Box::new(Echo);
        let reply = backend.generate(InferenceRequest::new("ping")).await.unwrap();
        assert_eq!(reply, "ping");
        assert_eq!(backend.name(), "echo");
    }
}
