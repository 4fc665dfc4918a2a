//! Driving a model through a focal cycle, with retry-on-unparsable-reply.

use std::time::Duration;

use talewright_core::{ExternalCallError, Inference, InferenceRequest};

use crate::cycle::FocalCycle;
use crate::outcome::{Outcome, ParseFailure};
use crate::registry::CallbackRegistry;

/// A callback request against one registry.
///
/// Each attempt is a fresh [`FocalCycle`]. The instruction block is appended
/// to the prompt unless the prompt already carries it. Parse failures are
/// retried with a clarification naming the failure; inference errors and
/// timeouts abort immediately.
#[derive(Debug, Clone)]
pub struct FocalRequest<'r> {
    registry: &'r CallbackRegistry,
    request: InferenceRequest,
    retries: u32,
    timeout: Option<Duration>,
}

impl<'r> FocalRequest<'r> {
    pub fn new(registry: &'r CallbackRegistry, request: InferenceRequest) -> Self {
        Self {
            registry,
            request,
            retries: 0,
            timeout: None,
        }
    }

    /// Extra attempts after an unparsable reply.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Per-attempt timeout for the inference call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn send(&self, inference: &dyn Inference) -> talewright_core::Result<Outcome> {
        let mut clarification: Option<ParseFailure> = None;
        let mut attempt = 0;

        loop {
            let mut cycle = FocalCycle::new(self.registry);
            let instructions = cycle.render()?;

            let mut request = self.request.clone();
            if !request.prompt.contains(&instructions) {
                request.prompt = format!("{}\n\n{instructions}", request.prompt);
            }
            if let Some(failure) = &clarification {
                request.prompt.push_str(&clarify(failure));
            }

            let reply = self.generate(inference, request).await?;
            let outcome = cycle.receive(&reply)?;

            match outcome {
                Outcome::ParseFailure(failure) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        backend = inference.name(),
                        attempt,
                        retries = self.retries,
                        reason = %failure,
                        "Unusable reply, retrying with clarification"
                    );
                    clarification = Some(failure);
                }
                Outcome::ParseFailure(failure) => {
                    tracing::warn!(
                        backend = inference.name(),
                        reason = %failure,
                        "Giving up on unparsable reply"
                    );
                    return Ok(Outcome::ParseFailure(failure));
                }
                resolved => return Ok(resolved),
            }
        }
    }

    async fn generate(
        &self,
        inference: &dyn Inference,
        request: InferenceRequest,
    ) -> Result<String, ExternalCallError> {
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, inference.generate(request))
                .await
                .map_err(|_| ExternalCallError::Timeout {
                    call: format!("inference ({})", inference.name()),
                    timeout_secs: limit.as_secs(),
                })?,
            None => inference.generate(request).await,
        };
        if let Err(e) = &result {
            tracing::warn!(backend = inference.name(), error = %e, "Inference call failed");
        }
        result
    }
}

/// Render the instruction block onto `prompt`, call the model, and parse.
pub async fn request(
    registry: &CallbackRegistry,
    inference: &dyn Inference,
    prompt: &str,
    retries: u32,
) -> talewright_core::Result<Outcome> {
    FocalRequest::new(registry, InferenceRequest::new(prompt))
        .retries(retries)
        .send(inference)
        .await
}

fn clarify(failure: &ParseFailure) -> String {
    format!(
        "\n\nYour previous reply could not be used ({}). Reply again with exactly one \
         fenced json block calling one of the functions above.",
        failure.reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FailureKind;
    use crate::schema::{CallbackSchema, Parameter};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies from a script, recording every prompt it sees.
    struct ScriptedInference {
        replies: Mutex<Vec<Result<String, ExternalCallError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedInference {
        fn new(replies: Vec<Result<String, ExternalCallError>>) -> Self {
            let mut replies = replies;
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Inference for ScriptedInference {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: InferenceRequest) -> Result<String, ExternalCallError> {
            self.prompts.lock().unwrap().push(request.prompt);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ExternalCallError::inference("script exhausted")))
        }
    }

    struct Stalled;

    #[async_trait]
    impl Inference for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn generate(&self, _request: InferenceRequest) -> Result<String, ExternalCallError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    fn registry() -> CallbackRegistry {
        CallbackRegistry::with_schemas([CallbackSchema::new("revise", "Rewrite the line.")
            .param(Parameter::text("text", "New text"))
            .example(serde_json::json!({"text": "She smiles."}))])
        .unwrap()
    }

    const GOOD: &str = "```json\n{\"function\": \"revise\", \"arguments\": {\"text\": \"Better.\"}}\n```";

    #[tokio::test]
    async fn first_reply_resolves() {
        let registry = registry();
        let inference = ScriptedInference::new(vec![Ok(GOOD.into())]);
        let outcome = request(&registry, &inference, "Fix the line.", 1).await.unwrap();
        assert_eq!(outcome.invocation().unwrap().name, "revise");

        let prompts = inference.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("Fix the line.\n\n"));
        assert!(prompts[0].contains("Function: `revise`"));
    }

    #[tokio::test]
    async fn retries_with_clarification() {
        let registry = registry();
        let inference = ScriptedInference::new(vec![Ok("Sure thing!".into()), Ok(GOOD.into())]);
        let outcome = request(&registry, &inference, "Fix the line.", 1).await.unwrap();
        assert!(outcome.invocation().is_some());

        let prompts = inference.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("could not be used"));
        assert!(prompts[1].contains("could not be used (no fenced json call block"));
    }

    #[tokio::test]
    async fn exhausted_retries_return_failure() {
        let registry = registry();
        let inference = ScriptedInference::new(vec![Ok("no".into()), Ok("still no".into())]);
        let outcome = request(&registry, &inference, "Fix the line.", 1).await.unwrap();
        assert_eq!(outcome.failure().map(|f| f.kind), Some(FailureKind::NoCall));
        assert_eq!(inference.prompts().len(), 2);
    }

    #[tokio::test]
    async fn zero_retries_makes_one_attempt() {
        let registry = registry();
        let inference = ScriptedInference::new(vec![Ok("no".into()), Ok(GOOD.into())]);
        let outcome = request(&registry, &inference, "p", 0).await.unwrap();
        assert!(outcome.is_failure());
        assert_eq!(inference.prompts().len(), 1);
    }

    #[tokio::test]
    async fn inference_error_aborts_without_retry() {
        let registry = registry();
        let inference = ScriptedInference::new(vec![
            Err(ExternalCallError::inference("backend down")),
            Ok(GOOD.into()),
        ]);
        let err = request(&registry, &inference, "p", 3).await.unwrap_err();
        assert!(matches!(
            err,
            talewright_core::Error::ExternalCall(ExternalCallError::Inference { .. })
        ));
        assert_eq!(inference.prompts().len(), 1);
    }

    #[tokio::test]
    async fn prompt_already_carrying_block_is_not_duplicated() {
        let registry = registry();
        let prompt = format!("Task.\n\n{}", registry.render());
        let inference = ScriptedInference::new(vec![Ok(GOOD.into())]);
        FocalRequest::new(&registry, InferenceRequest::new(prompt.clone()))
            .send(&inference)
            .await
            .unwrap();
        assert_eq!(inference.prompts()[0], prompt);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_maps_to_external_error() {
        let registry = registry();
        let err = FocalRequest::new(&registry, InferenceRequest::new("p"))
            .timeout(Duration::from_secs(5))
            .send(&Stalled)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            talewright_core::Error::ExternalCall(ExternalCallError::Timeout { timeout_secs: 5, .. })
        ));
    }
}
