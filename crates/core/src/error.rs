//! Error types for the Talewright domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Degraded-content signals
//! (an exhausted budget, a lookup that found nothing, an unparsable reply)
//! are values, not errors, and never appear here.

use thiserror::Error;

/// The top-level error type for all Talewright operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- External collaborators ---
    #[error("External call failed: {0}")]
    ExternalCall(#[from] ExternalCallError),

    // --- Scene log ---
    #[error("Message store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the inference or retrieval collaborators.
///
/// Always aborts the render cycle in flight; callers may retry the whole
/// cycle but never receive a partially assembled prompt.
#[derive(Debug, Clone, Error)]
pub enum ExternalCallError {
    #[error("inference failed: {reason}")]
    Inference { reason: String },

    #[error("memory retrieval failed: {reason}")]
    Retrieval { reason: String },

    #[error("{call} timed out after {timeout_secs}s")]
    Timeout { call: String, timeout_secs: u64 },

    #[error("{call} was cancelled")]
    Cancelled { call: String },
}

impl ExternalCallError {
    /// Shorthand for an inference failure.
    pub fn inference(reason: impl Into<String>) -> Self {
        Self::Inference {
            reason: reason.into(),
        }
    }

    /// Shorthand for a retrieval failure.
    pub fn retrieval(reason: impl Into<String>) -> Self {
        Self::Retrieval {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("no message with sequence index {0}")]
    UnknownIndex(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_call_error_displays_correctly() {
        let err = Error::ExternalCall(ExternalCallError::Timeout {
            call: "inference".into(),
            timeout_secs: 30,
        });
        assert!(err.to_string().contains("inference"));
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn cancellation_names_the_call() {
        let err: Error = ExternalCallError::Cancelled {
            call: "conversation turn".into(),
        }
        .into();
        assert_eq!(err.to_string(), "External call failed: conversation turn was cancelled");
    }

    #[test]
    fn store_error_converts() {
        let err: Error = StoreError::UnknownIndex(42).into();
        assert!(matches!(err, Error::Store(StoreError::UnknownIndex(42))));
        assert!(err.to_string().contains("42"));
    }
}
