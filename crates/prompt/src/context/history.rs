//! History selection: fitting a growing scene log into a token budget.
//!
//! The selector walks the snapshot from the newest message backward,
//! accumulating rendered lines while they fit the budget. A dialogue floor
//! overrides the budget: at least `min_dialogue` character/narrator lines
//! are kept when the scene has that many. The result is always a
//! contiguous suffix of the scene in chronological order, minus director
//! messages that are not addressed to the retained speaker.
//!
//! # Accounting
//!
//! Per-line counts are an estimate during the walk. Once the walk stops,
//! the joined text is counted exactly and the oldest lines not protected
//! by the floor are dropped until the exact count fits.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use talewright_core::{MessageKind, MessageSnapshot, SceneMessage, TokenCounter};

static SECTION_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\|SECTION:[^|]*\|>|<\|CLOSE_SECTION\|>").expect("valid regex")
});

/// Remove structural section markers from a line.
pub fn strip_section_markers(text: &str) -> String {
    SECTION_MARKER_RE.replace_all(text, "").trim().to_string()
}

/// A synthesized line to place `offset` lines before the end of the selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insertion {
    pub offset: usize,
    pub line: String,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryRequest {
    /// Token ceiling. Zero or negative keeps only the dialogue floor.
    pub budget: i64,
    pub min_dialogue: usize,
    pub strip_sections: bool,
    /// Keep director messages addressed to this character.
    pub retain_speaker: Option<String>,
    pub insertion: Option<Insertion>,
}

impl HistoryRequest {
    pub fn new(budget: i64) -> Self {
        Self {
            budget,
            ..Default::default()
        }
    }

    pub fn min_dialogue(mut self, count: usize) -> Self {
        self.min_dialogue = count;
        self
    }

    pub fn strip_sections(mut self, strip: bool) -> Self {
        self.strip_sections = strip;
        self
    }

    pub fn retain_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.retain_speaker = Some(speaker.into());
        self
    }

    pub fn insert(mut self, offset: usize, line: impl Into<String>) -> Self {
        self.insertion = Some(Insertion {
            offset,
            line: line.into(),
        });
        self
    }
}

/// The lines chosen for a prompt, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySelection {
    pub lines: Vec<String>,
    /// Scene indices of the selected messages (insertion excluded).
    pub indices: Vec<u64>,
    /// Exact token count of the joined lines, insertion included.
    pub tokens: usize,
    /// Eligible messages left out.
    pub dropped: usize,
    /// True when the dialogue floor forced content past the budget.
    pub floor_override: bool,
    /// Position of the inserted line, if the insertion happened.
    pub inserted: Option<usize>,
}

impl HistorySelection {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of dialogue lines, given the snapshot they came from.
    pub fn dialogue_count(&self, messages: &MessageSnapshot) -> usize {
        let slice = messages.as_slice();
        self.indices
            .iter()
            .filter_map(|&i| slice.get(i as usize))
            .filter(|m| m.is_dialogue())
            .count()
    }
}

/// Selects history lines. Stateless: create one and reuse it.
pub struct HistorySelector<'c> {
    counter: &'c dyn TokenCounter,
}

struct Picked<'m> {
    message: &'m SceneMessage,
    line: String,
}

impl<'c> HistorySelector<'c> {
    pub fn new(counter: &'c dyn TokenCounter) -> Self {
        Self { counter }
    }

    pub fn select(&self, messages: &MessageSnapshot, request: &HistoryRequest) -> HistorySelection {
        let budget = usize::try_from(request.budget).ok().filter(|&b| b > 0);
        let retain = request.retain_speaker.as_deref();

        let eligible = |m: &SceneMessage| match m.kind {
            MessageKind::Director => retain.is_some_and(|name| m.is_for(name)),
            _ => true,
        };
        let eligible_total = messages.iter().filter(|m| eligible(m)).count();

        // ── Backward walk ──────────────────────────────────────────────────
        let mut picked: Vec<Picked<'_>> = Vec::new();
        let mut used = 0usize;
        let mut dialogue = 0usize;
        let mut floor_override = false;

        for message in messages.iter().rev() {
            if !eligible(message) {
                continue;
            }
            let line = self.render(message, request.strip_sections);
            let estimate = self.counter.count(&line);
            let fits = budget.is_some_and(|b| used + estimate <= b);

            if !fits {
                if dialogue >= request.min_dialogue {
                    break;
                }
                floor_override = true;
            }
            used += estimate;
            if message.is_dialogue() {
                dialogue += 1;
            }
            picked.push(Picked { message, line });
        }
        picked.reverse();

        // ── Exact trim ─────────────────────────────────────────────────────
        let floor_start = floor_start(&picked, request.min_dialogue);
        let mut start = 0;
        let mut tokens = self.exact(&picked[start..]);
        if let Some(b) = budget {
            while tokens > b && start < floor_start {
                start += 1;
                tokens = self.exact(&picked[start..]);
            }
            if tokens > b && !picked[start..].is_empty() {
                floor_override = true;
            }
        } else if !picked.is_empty() {
            floor_override = true;
        }
        let picked = &picked[start..];

        let mut selection = HistorySelection {
            lines: picked.iter().map(|p| p.line.clone()).collect(),
            indices: picked.iter().map(|p| p.message.index).collect(),
            tokens,
            dropped: eligible_total - picked.len(),
            floor_override,
            inserted: None,
        };

        if let Some(insertion) = &request.insertion {
            self.apply_insertion(&mut selection, insertion);
        }

        tracing::debug!(
            kept = selection.indices.len(),
            dropped = selection.dropped,
            tokens = selection.tokens,
            budget = request.budget,
            floor_override = selection.floor_override,
            "Selected history"
        );
        selection
    }

    fn render(&self, message: &SceneMessage, strip_sections: bool) -> String {
        let line = message.render_line();
        if strip_sections {
            strip_section_markers(&line)
        } else {
            line
        }
    }

    fn exact(&self, picked: &[Picked<'_>]) -> usize {
        let text = picked
            .iter()
            .map(|p| p.line.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.counter.count(&text)
    }

    fn apply_insertion(&self, selection: &mut HistorySelection, insertion: &Insertion) {
        let len = selection.lines.len();
        if insertion.offset > len {
            tracing::debug!(
                offset = insertion.offset,
                lines = len,
                "Insertion offset beyond selection, skipped"
            );
            return;
        }
        let at = len - insertion.offset;
        selection.lines.insert(at, insertion.line.clone());
        selection.inserted = Some(at);
        selection.tokens = self.counter.count(&selection.text());
    }
}

/// Position of the oldest line the dialogue floor protects.
fn floor_start(picked: &[Picked<'_>], min_dialogue: usize) -> usize {
    if min_dialogue == 0 {
        return picked.len();
    }
    let mut seen = 0;
    for (i, p) in picked.iter().enumerate().rev() {
        if p.message.is_dialogue() {
            seen += 1;
            if seen == min_dialogue {
                return i;
            }
        }
    }
    0
}

// ── Tests ─────────────────────────────────────────────────────────────────
