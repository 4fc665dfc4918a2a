//! Generation kinds: response length budgets and inference presets.
//!
//! A kind is a short tag such as `conversation`, `director` or
//! `analyze_freeform_short` that tells the backend what sort of reply is
//! wanted. Kinds built by [`make_kind`] carry an explicit length suffix.

/// Response budget that scales with the total context budget.
type Computed = fn(usize) -> usize;

const COMPUTED: &[(&str, Computed)] = &[
    ("create", |total: usize| 1024usize.min(total * 35 / 100)),
    ("create_concise", |total: usize| 400usize.min(total * 25 / 100)),
    ("director", |total: usize| 192usize.min(total * 25 / 100)),
];

/// Checked in order; the first substring found in the kind wins.
const LENGTH_SUBSTRINGS: &[(&str, usize)] = &[
    ("extensive", 2048),
    ("long", 1024),
    ("medium3", 750),
    ("medium2", 512),
    ("list", 300),
    ("medium", 192),
    ("short2", 128),
    ("short", 75),
    ("tiny2", 25),
    ("tiny", 10),
    ("yesno", 2),
];

const FIXED: &[(&str, usize)] = &[
    ("conversation", 75),
    ("summarize", 512),
    ("analyze", 500),
    ("analyze_long", 2048),
    ("analyze_freeform", 500),
    ("analyze_freeform_medium", 192),
    ("analyze_freeform_medium_short", 128),
    ("analyze_freeform_short", 10),
    ("narrate", 500),
    ("story", 300),
    ("create_short", 25),
    ("edit_add_detail", 200),
    ("edit_fix_exposition", 1024),
    ("edit_fix_continuity", 512),
    ("visualize", 150),
];

pub const DEFAULT_MAX_TOKENS: usize = 150;

/// Maximum response tokens for a kind.
///
/// Resolution order: budget-scaled kinds, then length substrings, then the
/// fixed table, then a trailing `_<digits>` suffix, else
/// [`DEFAULT_MAX_TOKENS`].
pub fn max_tokens_for_kind(kind: &str, total_budget: usize) -> usize {
    if let Some((_, f)) = COMPUTED.iter().find(|(k, _)| *k == kind) {
        return f(total_budget);
    }
    if let Some((_, n)) = LENGTH_SUBSTRINGS.iter().find(|(s, _)| kind.contains(s)) {
        return *n;
    }
    if let Some((_, n)) = FIXED.iter().find(|(k, _)| *k == kind) {
        return *n;
    }
    kind.rsplit('_')
        .next()
        .filter(|tail| !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|tail| tail.parse().ok())
        .unwrap_or(DEFAULT_MAX_TOKENS)
}

/// Build a kind from an action and an explicit length.
///
/// `analyze` without JSON output becomes `investigate`, which maps to the
/// same analytical preset but is not treated as a structured request.
pub fn make_kind(action: &str, length: usize, expect_json: bool) -> String {
    let action = if action == "analyze" && !expect_json {
        "investigate"
    } else {
        action
    };
    format!("{action}_{length}")
}

const PRESETS: &[(&str, &str)] = &[
    ("conversation", "conversation"),
    ("summarize", "summarization"),
    ("analyze", "analytical"),
    ("analyze_long", "analytical"),
    ("analyze_freeform", "analytical"),
    ("analyze_freeform_short", "analytical"),
    ("analyze_freeform_medium", "analytical"),
    ("analyze_freeform_medium_short", "analytical"),
    ("narrate", "creative"),
    ("create", "creative_instruction"),
    ("create_short", "creative_instruction"),
    ("create_concise", "creative_instruction"),
    ("director", "scene_direction"),
    ("edit_add_detail", "creative"),
    ("edit_fix_exposition", "deterministic"),
    ("edit_fix_continuity", "deterministic"),
    ("visualize", "creative_instruction"),
];

/// Checked in order; the last substring found in the kind wins.
const PRESET_SUBSTRINGS: &[(&str, &str)] = &[
    ("deterministic", "deterministic"),
    ("creative", "creative"),
    ("create", "creative"),
    ("analytical", "analytical"),
    ("analyze", "analytical"),
    ("investigate", "analytical"),
    ("direction", "scene_direction"),
    ("summarize", "summarization"),
    ("edit", "creative_instruction"),
];

pub const DEFAULT_PRESET: &str = "scene_direction";

/// Inference preset name for a kind.
pub fn preset_for_kind(kind: &str) -> &'static str {
    if let Some((_, preset)) = PRESETS.iter().find(|(k, _)| *k == kind) {
        return *preset;
    }
    match PRESET_SUBSTRINGS.iter().rev().find(|(s, _)| kind.contains(s)) {
        Some((_, preset)) => *preset,
        None => {
            tracing::warn!(kind, "No preset for kind, using {DEFAULT_PRESET}");
            DEFAULT_PRESET
        }
    }
}
