//! One render → reply → parse cycle against a registry.
//!
//! ```text
//! Idle ─render─▶ AwaitingReply ─receive─▶ Resolved | Failed
//! ```
//!
//! Rendering and parsing happen inside `render` and `receive`, so they are
//! never visible as states of their own. A cycle is single-use. Start a new one for every attempt.

use crate::FocalError;
use crate::outcome::{Outcome, ParseFailure};
use crate::registry::CallbackRegistry;

#[derive(Debug, Clone, PartialEq)]
pub enum CycleState {
    Idle,
    AwaitingReply,
    /// Holds `NoAction` or `Invocation`.
    Resolved(Outcome),
    Failed(ParseFailure),
}

impl CycleState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingReply => "awaiting_reply",
            Self::Resolved(_) => "resolved",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved(_) | Self::Failed(_))
    }
}

#[derive(Debug)]
pub struct FocalCycle<'r> {
    registry: &'r CallbackRegistry,
    state: CycleState,
}

impl<'r> FocalCycle<'r> {
    pub fn new(registry: &'r CallbackRegistry) -> Self {
        Self {
            registry,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    /// Produce the instruction block and wait for a reply.
    pub fn render(&mut self) -> Result<String, FocalError> {
        self.expect("render", |s| matches!(s, CycleState::Idle))?;
        let block = self.registry.render();
        self.state = CycleState::AwaitingReply;
        Ok(block)
    }

    /// Feed the model reply and resolve the cycle.
    pub fn receive(&mut self, raw: &str) -> Result<Outcome, FocalError> {
        self.expect("receive", |s| matches!(s, CycleState::AwaitingReply))?;
        let outcome = self.registry.parse(raw);
        self.state = match &outcome {
            Outcome::ParseFailure(failure) => CycleState::Failed(failure.clone()),
            resolved => CycleState::Resolved(resolved.clone()),
        };
        Ok(outcome)
    }

    /// The final outcome, once the cycle is terminal.
    pub fn into_outcome(self) -> Result<Outcome, FocalError> {
        match self.state {
            CycleState::Resolved(outcome) => Ok(outcome),
            CycleState::Failed(failure) => Ok(Outcome::ParseFailure(failure)),
            other => Err(FocalError::InvalidTransition {
                from: other.name(),
                action: "finish",
            }),
        }
    }

    fn expect(
        &self,
        action: &'static str,
        allowed: impl Fn(&CycleState) -> bool,
    ) -> Result<(), FocalError> {
        if allowed(&self.state) {
            Ok(())
        } else {
            Err(FocalError::InvalidTransition {
                from: self.state.name(),
                action,
            })
        }
    }
}
