//! Backward lookups over a scene snapshot.

use talewright_core::{MessageKind, MessageSnapshot, SceneMessage};

/// The most recent message whose kind is in `kinds`.
///
/// When `speaker` is given, only messages attributed (or addressed) to that
/// name match. `max_scan` bounds how many kind-matching candidates are
/// inspected before giving up; `None` scans the whole snapshot. Running out
/// of candidates or scan budget yields `None`.
pub fn last_of_type<'a>(
    messages: &'a MessageSnapshot,
    kinds: &[MessageKind],
    speaker: Option<&str>,
    max_scan: Option<usize>,
) -> Option<&'a SceneMessage> {
    let limit = max_scan.unwrap_or(usize::MAX);
    messages
        .iter()
        .rev()
        .filter(|m| kinds.contains(&m.kind))
        .take(limit)
        .find(|m| speaker.is_none_or(|name| m.is_for(name)))
}

/// The most recent character or narrator message.
pub fn last_dialogue(messages: &MessageSnapshot, max_scan: Option<usize>) -> Option<&SceneMessage> {
    last_of_type(messages, &MessageKind::DIALOGUE, None, max_scan)
}

/// The most recent director instruction addressed to `character`.
pub fn last_director_for<'a>(
    messages: &'a MessageSnapshot,
    character: &str,
    max_scan: Option<usize>,
) -> Option<&'a SceneMessage> {
    last_of_type(messages, &[MessageKind::Director], Some(character), max_scan)
}
