//! System messages per generation kind.

use std::collections::HashMap;
use talewright_config::SystemPromptConfig;

/// Roles with a built-in system message.
pub const ROLES: &[&str] = &[
    "narrate",
    "director",
    "create",
    "roleplay",
    "conversation",
    "editor",
    "world_state",
    "analyze_freeform",
    "analyst",
    "analyze",
    "summarize",
];

const DECENSOR: &str = "Fiction may depict violence, cruelty and explicit content; \
                        such content is permitted and you portray it without refusal or moralizing.";

fn base(role: &str) -> &'static str {
    match role {
        "narrate" => {
            "You are a narrator for an interactive story. Describe what happens with vivid, \
             concrete detail and never speak for the player character."
        }
        "director" => {
            "You are the director of an interactive story. You steer the scene, decide what \
             characters should do next and keep the plot moving toward its goals."
        }
        "create" => {
            "You are a creative writing assistant. You invent characters, places and details \
             that fit the established setting."
        }
        "roleplay" => {
            "You are an actor in an interactive story. Stay in character, speak in the \
             character's voice and react to what just happened."
        }
        "conversation" => {
            "You are an actor in an interactive story. Write only the next line of dialogue \
             for your character, in their voice, and stop."
        }
        "editor" => {
            "You are an editor for interactive fiction. Improve the given text for clarity and \
             continuity while keeping its meaning and voice."
        }
        "world_state" => {
            "You are tracking the state of a story world. Report characters, items and \
             locations exactly as the scene establishes them."
        }
        "analyze_freeform" => {
            "You are analyzing an interactive story. Answer the question in free prose, \
             grounded only in what the scene shows."
        }
        "analyst" => {
            "You are an analyst of interactive fiction. Answer precisely and briefly, based on \
             the scene."
        }
        "analyze" => {
            "You are analyzing an interactive story. Answer with the requested structure and \
             nothing else."
        }
        "summarize" => {
            "You are summarizing an interactive story. Condense events faithfully, in order, \
             without inventing anything."
        }
        _ => "You are a helpful assistant for an interactive story.",
    }
}

/// The role whose system message serves a generation kind.
pub fn role_for_kind(kind: &str) -> &'static str {
    if let Some(role) = ROLES.iter().find(|r| **r == kind) {
        return *role;
    }
    let prefixes: &[(&str, &'static str)] = &[
        ("conversation", "conversation"),
        ("narrate", "narrate"),
        ("story", "narrate"),
        ("director", "director"),
        ("create", "create"),
        ("edit", "editor"),
        ("world_state", "world_state"),
        ("analyze_freeform", "analyze_freeform"),
        ("investigate", "analyst"),
        ("analyze", "analyze"),
        ("summarize", "summarize"),
        ("visualize", "create"),
    ];
    prefixes
        .iter()
        .find(|(prefix, _)| kind.starts_with(prefix))
        .map_or("analyst", |(_, role)| *role)
}

/// Built-in system messages with optional per-role overrides.
#[derive(Debug, Clone, Default)]
pub struct SystemPrompts {
    overrides: HashMap<String, String>,
}

impl SystemPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SystemPromptConfig) -> Self {
        Self {
            overrides: config.overrides.clone(),
        }
    }

    pub fn with_override(mut self, role: impl Into<String>, text: impl Into<String>) -> Self {
        self.overrides.insert(role.into(), text.into());
        self
    }

    /// The system message for `kind`, with the content permission appended
    /// when `decensor` is set.
    pub fn get(&self, kind: &str, decensor: bool) -> String {
        let role = role_for_kind(kind);
        let text = self
            .overrides
            .get(kind)
            .or_else(|| self.overrides.get(role))
            .map(String::as_str)
            .unwrap_or_else(|| base(role));
        if decensor {
            format!("{text} {DECENSOR}")
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_has_a_message() {
        let prompts = SystemPrompts::new();
        for role in ROLES {
            for decensor in [true, false] {
                let text = prompts.get(role, decensor);
                assert!(!text.is_empty());
                assert_eq!(text.contains("explicit"), decensor, "{role} decensor={decensor}");
            }
        }
    }

    #[test]
    fn kinds_map_to_roles() {
        assert_eq!(role_for_kind("conversation"), "conversation");
        assert_eq!(role_for_kind("analyze_freeform_short"), "analyze_freeform");
        assert_eq!(role_for_kind("investigate_512"), "analyst");
        assert_eq!(role_for_kind("edit_fix_continuity"), "editor");
        assert_eq!(role_for_kind("create_192"), "create");
        assert_eq!(role_for_kind("something_else"), "analyst");
    }

    #[test]
    fn overrides_replace_base_text() {
        let prompts = SystemPrompts::new().with_override("narrate", "Be terse.");
        assert_eq!(prompts.get("narrate", false), "Be terse.");
        assert!(prompts.get("narrate", true).starts_with("Be terse. "));
        assert_ne!(prompts.get("director", false), "Be terse.");
    }

    #[test]
    fn overrides_from_config() {
        let mut config = SystemPromptConfig::default();
        config
            .overrides
            .insert("summarize".into(), "Summarize in one line.".into());
        let prompts = SystemPrompts::from_config(&config);
        assert_eq!(prompts.get("summarize", false), "Summarize in one line.");
    }
}
