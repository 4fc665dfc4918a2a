//! Where guidance goes relative to the history block.
//!
//! Short histories keep guidance up front, next to the task statement.
//! Long histories push it after the history, where models attend to it
//! more reliably.

use serde::{Deserialize, Serialize};
use talewright_core::TokenCounter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    BeforeHistory,
    AfterHistory,
}

/// `BeforeHistory` strictly below `threshold`, `AfterHistory` at or above it.
pub fn decide_placement(history_tokens: usize, threshold: usize) -> Placement {
    if history_tokens < threshold {
        Placement::BeforeHistory
    } else {
        Placement::AfterHistory
    }
}

/// Join the non-empty parts with blank lines; `None` when nothing is left.
pub fn merge_guidance<S: AsRef<str>>(parts: &[S]) -> Option<String> {
    let merged = parts
        .iter()
        .map(|p| p.as_ref().trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    (!merged.is_empty()).then_some(merged)
}

/// Guidance split into the early and late slots around the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedGuidance {
    pub placement: Placement,
    pub early: Option<String>,
    pub late: Option<String>,
    pub history_tokens: usize,
}

/// Measure `history`, merge the non-empty guidance parts and put them in
/// the slot the measurement selects.
pub fn place_guidance<S: AsRef<str>>(
    history: &str,
    parts: &[S],
    threshold: usize,
    counter: &dyn TokenCounter,
) -> PlacedGuidance {
    let history_tokens = counter.count(history);
    let placement = decide_placement(history_tokens, threshold);

    let guidance = merge_guidance(parts);

    tracing::debug!(history_tokens, threshold, ?placement, "Placed guidance");

    let (early, late) = match placement {
        Placement::BeforeHistory => (guidance, None),
        Placement::AfterHistory => (None, guidance),
    };
    PlacedGuidance {
        placement,
        early,
        late,
        history_tokens,
    }
}
