//! Prompt post-processing: prefill coercion, repetition hints and stop strings.

/// Marks where the prompt ends and the forced start of the reply begins.
pub const BOT_MARKER: &str = "<|BOT|>";

/// Line prefix for text used only when the model is repeating itself.
pub const REPETITION_PREFIX: &str = "[$REPETITION|";

const INDIRECT_COERCION: &str = "\nStart your response with: ";

/// Split off the prefill after [`BOT_MARKER`], if any.
///
/// The returned prompt is unchanged; backends that support prefill send
/// the second element as the start of the assistant turn.
pub fn split_for_coercion(prompt: &str) -> (&str, Option<&str>) {
    match prompt.split_once(BOT_MARKER) {
        Some((_, prefill)) => (prompt, Some(prefill)),
        None => (prompt, None),
    }
}

/// Strip an indirectly requested reply prefix from `response`.
///
/// When `prompt` contains `Start your response with: X`, a reply that
/// starts with `X` has it removed. When `X` opens a JSON object and the
/// reply is a fenced json block, the fence is removed first.
pub fn strip_indirect_coercion(prompt: &str, response: &str) -> String {
    let Some((_, expected)) = prompt.rsplit_once(INDIRECT_COERCION) else {
        return response.to_string();
    };
    let expected = expected.trim();
    let mut response = response;
    if expected.starts_with('{') {
        if let Some(inner) = response
            .strip_prefix("```json")
            .and_then(|r| r.strip_suffix("```"))
        {
            response = inner.trim();
        }
    }
    if !expected.is_empty() {
        if let Some(rest) = response.strip_prefix(expected) {
            return rest.trim().to_string();
        }
    }
    response.to_string()
}

/// Resolve `[$REPETITION|text]` lines: `text` when the model is repeating
/// itself, an empty line otherwise.
pub fn repetition_adjustment(prompt: &str, is_repetitive: bool) -> String {
    prompt
        .split('\n')
        .map(|line| match line.strip_prefix(REPETITION_PREFIX) {
            Some(rest) if is_repetitive => rest
                .split('|')
                .next()
                .map(|text| text.strip_suffix(']').unwrap_or(text))
                .unwrap_or_default(),
            Some(_) => "",
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Stop conditions that end a dialogue turn before another character speaks.
pub fn dialogue_stop_strings<S: AsRef<str>>(other_characters: &[S]) -> Vec<String> {
    let names: Vec<&str> = other_characters.iter().map(|n| n.as_ref()).collect();
    names
        .iter()
        .map(|name| format!("{name}:"))
        .chain(names.iter().map(|name| format!("{}\n", name.to_uppercase())))
        .collect()
}
