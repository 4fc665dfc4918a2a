//! One scene turn, end to end.
//!
//! 1. **Snapshot** the shared scene log
//! 2. **Recall** memory for the most recent dialogue line
//! 3. **Render** the prompt against the snapshot
//! 4. **Generate** with stop conditions and a per-call timeout
//! 5. **Parse** the reply against the callback registry, retrying with a
//!    clarification when it cannot be used
//!
//! Any failure of the retriever or the backend aborts the turn. No prompt is
//! sent after a failed retrieval. [`SceneTurn::run_until`] also aborts when
//! the caller cancels.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use talewright_config::AppConfig;
use talewright_core::{
    ExternalCallError, Inference, InferenceRequest, MessageSnapshot, RetrievalQuery, Retriever,
    SharedMessageStore, TokenCounter,
};
use talewright_focal::{CallbackRegistry, FocalRequest, Outcome};
use tracing::{debug, info, warn};

use crate::coercion::dialogue_stop_strings;
use crate::context::{PromptComposer, RenderInput, RenderedPrompt, last_dialogue};
use crate::kind::max_tokens_for_kind;
use crate::system::SystemPrompts;

/// What the caller wants from this turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// The character being prompted, if any
    pub character: Option<String>,

    /// Generation kind (e.g. "conversation", "director")
    pub kind: String,

    pub context: String,
    pub task: String,
    pub guidance: Vec<String>,
    pub acting_instruction: Option<String>,
    pub scaffolding: String,
}

impl TurnRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_character(mut self, name: impl Into<String>) -> Self {
        self.character = Some(name.into());
        self
    }

    pub fn with_context(mut self, text: impl Into<String>) -> Self {
        self.context = text.into();
        self
    }

    pub fn with_task(mut self, text: impl Into<String>) -> Self {
        self.task = text.into();
        self
    }

    pub fn with_guidance(mut self, part: impl Into<String>) -> Self {
        self.guidance.push(part.into());
        self
    }

    pub fn with_acting_instruction(mut self, line: impl Into<String>) -> Self {
        self.acting_instruction = Some(line.into());
        self
    }

    pub fn with_scaffolding(mut self, text: impl Into<String>) -> Self {
        self.scaffolding = text.into();
        self
    }
}

/// The result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    /// The prompt as rendered, before the instruction block check
    pub prompt: RenderedPrompt,

    /// The parsed reply
    pub outcome: Outcome,
}

/// Runs scene turns against one set of collaborators.
pub struct SceneTurn {
    /// Prompt assembly
    composer: PromptComposer,

    /// Callbacks offered to the model
    registry: Arc<CallbackRegistry>,

    /// Long-term memory
    retriever: Arc<dyn Retriever>,

    /// Text-generation backend
    inference: Arc<dyn Inference>,

    /// System messages per generation kind
    system: SystemPrompts,

    /// Append the content permission to system messages
    decensor: bool,

    /// Timeout for each external call
    timeout: Duration,

    /// Extra attempts after an unparsable reply
    parse_retries: u32,
}

impl SceneTurn {
    pub fn new(
        config: &AppConfig,
        counter: Arc<dyn TokenCounter>,
        registry: Arc<CallbackRegistry>,
        retriever: Arc<dyn Retriever>,
        inference: Arc<dyn Inference>,
    ) -> Self {
        Self {
            composer: PromptComposer::new(config.prompt.clone(), counter),
            registry,
            retriever,
            inference,
            system: SystemPrompts::from_config(&config.system_prompts),
            decensor: config.system_prompts.decensor,
            timeout: Duration::from_secs(config.inference.timeout_secs),
            parse_retries: config.inference.parse_retries,
        }
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn composer(&self) -> &PromptComposer {
        &self.composer
    }

    /// Run one turn against the current state of `store`.
    pub async fn run(
        &self,
        store: &SharedMessageStore,
        request: &TurnRequest,
    ) -> talewright_core::Result<TurnResult> {
        let messages = store.snapshot().await;
        let memory = self.recall(&messages).await?;

        let mut input = RenderInput::new(&messages)
            .context(&request.context)
            .memory(&memory)
            .task(&request.task)
            .callbacks(&self.registry)
            .guidance(&request.guidance)
            .scaffolding(&request.scaffolding);
        if let Some(name) = request.character.as_deref() {
            input = input.character(name);
        }
        if let Some(line) = request.acting_instruction.as_deref() {
            input = input.acting_instruction(line);
        }
        let prompt = self.composer.render(&input);

        let inference_request = self.inference_request(&messages, request, &prompt.text);
        debug!(
            kind = %request.kind,
            max_tokens = ?inference_request.max_tokens,
            stops = inference_request.stop.len(),
            "Sending turn prompt"
        );

        let outcome = FocalRequest::new(&self.registry, inference_request)
            .retries(self.parse_retries)
            .timeout(self.timeout)
            .send(self.inference.as_ref())
            .await?;

        info!(
            kind = %request.kind,
            character = request.character.as_deref().unwrap_or("-"),
            outcome = outcome_label(&outcome),
            "Turn complete"
        );
        Ok(TurnResult { prompt, outcome })
    }

    /// Like [`run`](Self::run), but abandons the turn as soon as `cancel`
    /// completes. Whatever call was in flight is dropped.
    pub async fn run_until(
        &self,
        store: &SharedMessageStore,
        request: &TurnRequest,
        cancel: impl Future<Output = ()>,
    ) -> talewright_core::Result<TurnResult> {
        tokio::select! {
            biased;
            () = cancel => {
                warn!(kind = %request.kind, "Turn cancelled");
                Err(ExternalCallError::Cancelled {
                    call: format!("{} turn", request.kind),
                }
                .into())
            }
            result = self.run(store, request) => result,
        }
    }

    /// Snippets for the most recent dialogue line, or none when there is
    /// nothing to ask about.
    async fn recall(&self, messages: &MessageSnapshot) -> Result<Vec<String>, ExternalCallError> {
        let cfg = self.composer.config();
        if cfg.memory_budget == 0 {
            return Ok(vec![]);
        }
        let Some(latest) = last_dialogue(messages, cfg.lookup_max_scan) else {
            return Ok(vec![]);
        };

        let query = RetrievalQuery::new(latest.render_line(), cfg.memory_budget);
        let result = tokio::time::timeout(self.timeout, self.retriever.retrieve(&query))
            .await
            .map_err(|_| ExternalCallError::Timeout {
                call: format!("retrieval ({})", self.retriever.name()),
                timeout_secs: self.timeout.as_secs(),
            })
            .and_then(|r| r);

        match result {
            Ok(snippets) => {
                if !snippets.is_empty() {
                    debug!(count = snippets.len(), backend = self.retriever.name(), "Recalled memory");
                }
                Ok(snippets)
            }
            Err(e) => {
                warn!(backend = self.retriever.name(), error = %e, "Memory retrieval failed, aborting turn");
                Err(e)
            }
        }
    }

    fn inference_request(
        &self,
        messages: &MessageSnapshot,
        request: &TurnRequest,
        prompt: &str,
    ) -> InferenceRequest {
        let kind = request.kind.as_str();
        let max_tokens = max_tokens_for_kind(kind, self.composer.config().max_tokens);
        let mut inference_request = InferenceRequest::new(prompt)
            .with_kind(kind)
            .with_max_tokens(max_tokens)
            .with_system(self.system.get(kind, self.decensor));

        if kind.starts_with("conversation") {
            if let Some(name) = request.character.as_deref() {
                let others: Vec<&str> = messages
                    .characters()
                    .into_iter()
                    .filter(|other| *other != name)
                    .collect();
                inference_request = inference_request.with_stop(dialogue_stop_strings(&others));
            }
        }
        inference_request
    }
}

fn outcome_label(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Invocation(_) => "invocation",
        Outcome::NoAction => "no_action",
        Outcome::ParseFailure(_) => "parse_failure",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use talewright_core::{Error, MessageStore, NewMessage};
    use talewright_focal::{CallbackSchema, FailureKind, Parameter};

    // ── Doubles ────────────────────────────────────────────────────────

    struct ScriptedInference {
        replies: Mutex<Vec<String>>,
        requests: Mutex<Vec<InferenceRequest>>,
    }

    impl ScriptedInference {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                requests: Mutex::new(vec![]),
            })
        }

        fn requests(&self) -> Vec<InferenceRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Inference for ScriptedInference {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: InferenceRequest) -> Result<String, ExternalCallError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ExternalCallError::inference("script exhausted"))
        }
    }

    struct FixedRetriever {
        snippets: Vec<String>,
        queries: Mutex<Vec<RetrievalQuery>>,
    }

    impl FixedRetriever {
        fn new(snippets: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                snippets: snippets.iter().map(|s| s.to_string()).collect(),
                queries: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<String>, ExternalCallError> {
            self.queries.lock().unwrap().push(query.clone());
            Ok(self.snippets.clone())
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        fn name(&self) -> &str {
            "failing"
        }

        async fn retrieve(&self, _query: &RetrievalQuery) -> Result<Vec<String>, ExternalCallError> {
            Err(ExternalCallError::retrieval("index offline"))
        }
    }

    struct StalledRetriever;

    #[async_trait]
    impl Retriever for StalledRetriever {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn retrieve(&self, _query: &RetrievalQuery) -> Result<Vec<String>, ExternalCallError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn registry() -> Arc<CallbackRegistry> {
        Arc::new(
            CallbackRegistry::with_schemas([CallbackSchema::new("say", "Speak a line.")
                .param(Parameter::text("text", "The line"))])
            .unwrap(),
        )
    }

    fn store() -> SharedMessageStore {
        SharedMessageStore::new(MessageStore::from_drafts([
            NewMessage::narrator("Rain on the harbor."),
            NewMessage::character("Kai", "You came back."),
            NewMessage::character("Mira", "Someone had to."),
            NewMessage::character("Ava", "Where is the ledger?"),
        ]))
    }

    fn turn(retriever: Arc<dyn Retriever>, inference: Arc<dyn Inference>) -> SceneTurn {
        SceneTurn::new(
            &AppConfig::default(),
            Arc::new(words),
            registry(),
            retriever,
            inference,
        )
    }

    const SAY: &str = "```json\n{\"function\": \"say\", \"arguments\": {\"text\": \"Hidden.\"}}\n```";

    // ── Tests ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn full_turn_yields_invocation() {
        let retriever = FixedRetriever::new(&["Ava hid the ledger in the chapel."]);
        let inference = ScriptedInference::new(&[SAY]);
        let request = TurnRequest::new("conversation")
            .with_character("Ava")
            .with_context("A harbor town.")
            .with_task("Write Ava's next line.");

        let result = turn(retriever.clone(), inference.clone())
            .run(&store(), &request)
            .await
            .unwrap();

        let invocation = result.outcome.invocation().unwrap();
        assert_eq!(invocation.name, "say");
        assert_eq!(invocation.get("text").and_then(|v| v.as_str()), Some("Hidden."));

        let queries = retriever.queries.lock().unwrap().clone();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].text, "Ava: Where is the ledger?");

        let sent = inference.requests();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].prompt.contains("Ava hid the ledger in the chapel."));
        assert_eq!(sent[0].prompt.matches("Function: `say`").count(), 1);
        assert_eq!(sent[0].kind.as_deref(), Some("conversation"));
        assert_eq!(sent[0].max_tokens, Some(75));
        assert_eq!(sent[0].stop, vec!["Kai:", "Mira:", "KAI\n", "MIRA\n"]);
        assert!(sent[0].system.as_deref().is_some_and(|s| !s.is_empty()));
    }

    #[tokio::test]
    async fn non_conversation_kinds_have_no_stops() {
        let inference = ScriptedInference::new(&[SAY]);
        let request = TurnRequest::new("director").with_character("Ava");
        turn(FixedRetriever::new(&[]), inference.clone())
            .run(&store(), &request)
            .await
            .unwrap();
        let sent = inference.requests();
        assert!(sent[0].stop.is_empty());
        assert_eq!(sent[0].max_tokens, Some(192));
    }

    #[tokio::test]
    async fn failed_retrieval_sends_nothing() {
        let inference = ScriptedInference::new(&[SAY]);
        let err = turn(Arc::new(FailingRetriever), inference.clone())
            .run(&store(), &TurnRequest::new("conversation"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ExternalCall(ExternalCallError::Retrieval { .. })
        ));
        assert!(inference.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_retrieval_times_out() {
        let inference = ScriptedInference::new(&[SAY]);
        let err = turn(Arc::new(StalledRetriever), inference.clone())
            .with_timeout(Duration::from_secs(5))
            .run(&store(), &TurnRequest::new("conversation"))
            .await
            .unwrap_err();
        match err {
            Error::ExternalCall(ExternalCallError::Timeout { call, timeout_secs }) => {
                assert_eq!(call, "retrieval (stalled)");
                assert_eq!(timeout_secs, 5);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(inference.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_turn_stops_before_inference() {
        let inference = ScriptedInference::new(&[SAY]);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = tx.send(());
        });

        let err = turn(Arc::new(StalledRetriever), inference.clone())
            .with_timeout(Duration::from_secs(7200))
            .run_until(&store(), &TurnRequest::new("conversation"), async {
                let _ = rx.await;
            })
            .await
            .unwrap_err();
        match err {
            Error::ExternalCall(ExternalCallError::Cancelled { call }) => {
                assert_eq!(call, "conversation turn");
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert!(inference.requests().is_empty());
    }

    #[tokio::test]
    async fn uncancelled_turn_completes() {
        let result = turn(FixedRetriever::new(&[]), ScriptedInference::new(&[SAY]))
            .run_until(&store(), &TurnRequest::new("conversation"), std::future::pending())
            .await
            .unwrap();
        assert_eq!(result.outcome.invocation().unwrap().name, "say");
    }

    #[tokio::test]
    async fn empty_scene_skips_retrieval() {
        let retriever = FixedRetriever::new(&["unused"]);
        let inference = ScriptedInference::new(&[SAY]);
        turn(retriever.clone(), inference)
            .run(&SharedMessageStore::default(), &TurnRequest::new("narrate"))
            .await
            .unwrap();
        assert!(retriever.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unusable_reply_retried_then_reported() {
        // Default config allows one retry.
        let inference = ScriptedInference::new(&["I refuse.", "Still no block."]);
        let result = turn(FixedRetriever::new(&[]), inference.clone())
            .run(&store(), &TurnRequest::new("conversation"))
            .await
            .unwrap();
        let failure = result.outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::NoCall);
        assert_eq!(inference.requests().len(), 2);
    }

    #[tokio::test]
    async fn turn_sees_snapshot_taken_at_start() {
        let shared = store();
        let inference = ScriptedInference::new(&[SAY]);
        let result = turn(FixedRetriever::new(&[]), inference)
            .run(&shared, &TurnRequest::new("conversation"))
            .await
            .unwrap();
        shared.append(NewMessage::character("Kai", "Too late.")).await;
        assert!(!result.prompt.text.contains("Too late."));
    }
}
