//! What parsing a model reply can produce.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A coerced argument value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// A choice argument, in the declared spelling.
    Choice(String),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Choice(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) | Self::Choice(s) => serde_json::Value::String(s.clone()),
            Self::Integer(n) => serde_json::Value::from(*n),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

/// A validated call to a registered callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    pub name: String,
    pub arguments: BTreeMap<String, ArgValue>,
}

impl Invocation {
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.arguments.get(name)
    }

    /// Arguments as a JSON object.
    pub fn arguments_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.arguments
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Why a reply could not be turned into an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoCall,
    Ambiguous,
    Malformed,
    UnknownCallback,
    MissingArgument,
    UnexpectedArgument,
    InvalidArgument,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCall => "no_call",
            Self::Ambiguous => "ambiguous",
            Self::Malformed => "malformed",
            Self::UnknownCallback => "unknown_callback",
            Self::MissingArgument => "missing_argument",
            Self::UnexpectedArgument => "unexpected_argument",
            Self::InvalidArgument => "invalid_argument",
        }
    }
}

/// A recoverable parse failure with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl ParseFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.reason)
    }
}

/// The result of parsing one reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    NoAction,
    Invocation(Invocation),
    ParseFailure(ParseFailure),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ParseFailure(_))
    }

    pub fn invocation(&self) -> Option<&Invocation> {
        match self {
            Self::Invocation(inv) => Some(inv),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&ParseFailure> {
        match self {
            Self::ParseFailure(f) => Some(f),
            _ => None,
        }
    }
}
