//! End-to-end tests for the Talewright scene pipeline.
//!
//! These exercise the full path from a scene log to a typed outcome:
//! memory recall, prompt composition, the callback instruction block, the
//! inference call and reply parsing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use talewright_config::{AppConfig, PromptConfig};
use talewright_core::{
    Error, ExternalCallError, Inference, InferenceRequest, MessageSnapshot, MessageStore,
    NewMessage, SharedMessageStore,
};
use talewright_focal::{ArgValue, CallbackRegistry, FailureKind, Outcome};
use talewright_memory::{InMemoryRetriever, NoopRetriever};
use talewright_prompt::{PromptComposer, RenderInput, RenderSignal, SceneTurn, TurnRequest};

// ── Scripted backend ─────────────────────────────────────────────────────

/// A backend that returns scripted replies in sequence.
struct ScriptedInference {
    replies: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedInference {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(vec![]),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Inference for ScriptedInference {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn generate(&self, request: InferenceRequest) -> Result<String, ExternalCallError> {
        self.prompts.lock().unwrap().push(request.prompt);
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| ExternalCallError::inference("no more replies"))
    }
}

/// A backend that never answers.
struct SilentInference;

#[async_trait::async_trait]
impl Inference for SilentInference {
    fn name(&self) -> &str {
        "silent"
    }

    async fn generate(&self, _request: InferenceRequest) -> Result<String, ExternalCallError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

const CALLBACKS: &str = r#"
[[callbacks]]
name = "say"
description = "Speak the character's next line."

[[callbacks.parameters]]
name = "text"
type = "str"
description = "What the character says"

[[callbacks.examples]]
text = "I'm not leaving without it."

[[callbacks]]
name = "set_mood"
description = "Change the character's mood."

[[callbacks.parameters]]
name = "mood"
type = "choice"
choices = ["calm", "tense", "angry"]

[[callbacks.parameters]]
name = "intensity"
type = "int"
required = false
"#;

fn words(text: &str) -> usize {
    text.split_whitespace().count()
}

fn registry() -> Arc<CallbackRegistry> {
    Arc::new(CallbackRegistry::from_toml(CALLBACKS).unwrap())
}

fn harbor_scene() -> SharedMessageStore {
    SharedMessageStore::new(MessageStore::from_drafts([
        NewMessage::narrator("Rain hammers the harbor office."),
        NewMessage::character("Kai", "You came back for it."),
        NewMessage::director_for("Ava", "Ava should deflect."),
        NewMessage::character("Mira", "We all did."),
        NewMessage::character("Ava", "Where is the ledger, Kai?"),
    ]))
}

fn fenced(call: &str) -> String {
    format!("Thinking it over.\n```json\n{call}\n```")
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_turn_with_memory_and_callbacks() {
    let memory = Arc::new(InMemoryRetriever::new().with_counter(Arc::new(words)));
    memory.remember("Kai sold the ledger to the harbor master.").await;
    memory.remember("Mira cannot swim.").await;

    let reply = fenced(r#"{"function": "say", "arguments": {"text": "It's gone, Ava."}}"#);
    let inference = ScriptedInference::new(&[&reply]);

    let turn = SceneTurn::new(
        &AppConfig::default(),
        Arc::new(words),
        registry(),
        memory,
        inference.clone(),
    );
    let request = TurnRequest::new("conversation")
        .with_character("Kai")
        .with_context("A smugglers' port, late autumn.")
        .with_task("Write Kai's next line.")
        .with_scaffolding("Kai:");

    let result = turn.run(&harbor_scene(), &request).await.unwrap();

    let invocation = result.outcome.invocation().unwrap();
    assert_eq!(invocation.name, "say");
    assert_eq!(
        invocation.get("text"),
        Some(&ArgValue::Text("It's gone, Ava.".into()))
    );

    let prompt = &inference.prompts()[0];
    assert!(prompt.contains("<|SECTION:MEMORY|>\nKai sold the ledger to the harbor master."));
    assert!(!prompt.contains("Mira cannot swim."));
    assert!(prompt.contains("Function: `set_mood`"));
    assert!(prompt.trim_end().ends_with("Kai:"));
    // The director note is for Ava, not the rendered character.
    assert!(!prompt.contains("(Director instructions for Ava"));
    assert_eq!(prompt, &result.prompt.text);
}

#[tokio::test]
async fn e2e_no_action_and_coercion() {
    let reply = fenced(r#"{"function": "set_mood", "arguments": {"mood": "Tense", "intensity": "3"}}"#);
    let inference = ScriptedInference::new(&[&reply, &fenced(r#"{"function": "do_nothing"}"#)]);
    let turn = SceneTurn::new(
        &AppConfig::default(),
        Arc::new(words),
        registry(),
        Arc::new(NoopRetriever),
        inference.clone(),
    );
    let store = harbor_scene();
    let request = TurnRequest::new("director").with_character("Ava");

    let first = turn.run(&store, &request).await.unwrap();
    let mood = first.outcome.invocation().unwrap();
    assert_eq!(mood.get("mood"), Some(&ArgValue::Choice("tense".into())));
    assert_eq!(mood.get("intensity"), Some(&ArgValue::Integer(3)));
    // Addressed to Ava, so it reaches her prompt exactly once.
    assert_eq!(
        first
            .prompt
            .text
            .matches("(Director instructions for Ava: Ava should deflect.)")
            .count(),
        1
    );

    let second = turn.run(&store, &request).await.unwrap();
    assert_eq!(second.outcome, Outcome::NoAction);
}

#[tokio::test]
async fn e2e_ambiguous_reply_surfaces_failure() {
    let one = fenced(r#"{"function": "say", "arguments": {"text": "A"}}"#);
    let two = fenced(r#"{"function": "say", "arguments": {"text": "B"}}"#);
    let both = format!("{one}\n{two}");
    let mut config = AppConfig::default();
    config.inference.parse_retries = 0;

    let inference = ScriptedInference::new(&[&both]);
    let turn = SceneTurn::new(
        &config,
        Arc::new(words),
        registry(),
        Arc::new(NoopRetriever),
        inference.clone(),
    );
    let result = turn
        .run(&harbor_scene(), &TurnRequest::new("conversation"))
        .await
        .unwrap();
    assert_eq!(result.outcome.failure().unwrap().kind, FailureKind::Ambiguous);
    assert_eq!(inference.prompts().len(), 1);
}

#[tokio::test]
async fn e2e_clarification_after_missing_argument() {
    let bad = fenced(r#"{"function": "say", "arguments": {}}"#);
    let good = fenced(r#"{"function": "say", "arguments": {"text": "Fine."}}"#);
    let inference = ScriptedInference::new(&[&bad, &good]);
    let turn = SceneTurn::new(
        &AppConfig::default(),
        Arc::new(words),
        registry(),
        Arc::new(NoopRetriever),
        inference.clone(),
    );
    let result = turn
        .run(&harbor_scene(), &TurnRequest::new("conversation"))
        .await
        .unwrap();
    assert_eq!(result.outcome.invocation().unwrap().name, "say");

    let prompts = inference.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Your previous reply could not be used"));
    assert!(prompts[1].contains("text"));
}

#[tokio::test(start_paused = true)]
async fn e2e_inference_timeout_aborts_turn() {
    let turn = SceneTurn::new(
        &AppConfig::default(),
        Arc::new(words),
        registry(),
        Arc::new(NoopRetriever),
        Arc::new(SilentInference),
    )
    .with_timeout(Duration::from_secs(30));
    let err = turn
        .run(&harbor_scene(), &TurnRequest::new("conversation"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ExternalCall(ExternalCallError::Timeout { timeout_secs: 30, .. })
    ));
}

#[tokio::test]
async fn e2e_parallel_scenes_do_not_interfere() {
    let say = |text: &str| fenced(&format!(r#"{{"function": "say", "arguments": {{"text": "{text}"}}}}"#));
    let harbor = harbor_scene();
    let chapel = SharedMessageStore::new(MessageStore::from_drafts([
        NewMessage::narrator("Candles gutter in the chapel."),
        NewMessage::character("Mira", "Is anyone here?"),
    ]));

    let first = SceneTurn::new(
        &AppConfig::default(),
        Arc::new(words),
        registry(),
        Arc::new(NoopRetriever),
        ScriptedInference::new(&[&say("harbor")]),
    );
    let second = SceneTurn::new(
        &AppConfig::default(),
        Arc::new(words),
        registry(),
        Arc::new(NoopRetriever),
        ScriptedInference::new(&[&say("chapel")]),
    );
    let request = TurnRequest::new("conversation");

    let (a, b) = tokio::join!(first.run(&harbor, &request), second.run(&chapel, &request));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.prompt.text.contains("Rain hammers"));
    assert!(!a.prompt.text.contains("Candles"));
    assert!(b.prompt.text.contains("Candles"));
    assert_eq!(
        b.outcome.invocation().unwrap().get("text"),
        Some(&ArgValue::Text("chapel".into()))
    );
}

#[test]
fn e2e_zero_budget_keeps_dialogue_floor() {
    // Ten dialogue lines, a floor of fifteen and no budget left after the context.
    let messages = MessageSnapshot::from_drafts((0..10).map(|i| {
        NewMessage::character(if i % 2 == 0 { "Ava" } else { "Kai" }, format!("line {i}"))
    }));
    let config = PromptConfig {
        max_tokens: 40,
        reserved_headroom: 0,
        section_overhead: 0,
        min_dialogue: 15,
        ..PromptConfig::default()
    };
    let context = "word ".repeat(60);
    let composer = PromptComposer::new(config, Arc::new(words));
    let out = composer.render(&RenderInput::new(&messages).context(&context));

    assert_eq!(out.metadata.history.lines, 10);
    assert!(out.metadata.has_signal(&RenderSignal::FloorOverride { dialogue: 10 }));
    let first = out.text.find("Ava: line 0").unwrap();
    let last = out.text.find("Kai: line 9").unwrap();
    assert!(first < last);
}
