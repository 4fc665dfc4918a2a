//! Callback declarations: the functions a model may call and their parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FocalError;

/// Name of the distinguished zero-parameter callback meaning "no action".
pub const NO_ACTION: &str = "do_nothing";

/// The declared type of a callback parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    /// A closed set of allowed strings.
    Choice { choices: Vec<String> },
}

impl ParamType {
    /// The short tag used in declarations and in the rendered block.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Choice { .. } => "choice",
        }
    }
}

/// A single named parameter of a callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParameter", into = "RawParameter")]
pub struct Parameter {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
    /// When false, newlines in text values are collapsed to single spaces.
    pub preserve_newlines: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
            preserve_newlines: true,
        }
    }

    pub fn text(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Str, description)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Int, description)
    }

    pub fn float(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Float, description)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Bool, description)
    }

    pub fn choice<I, S>(name: impl Into<String>, description: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let choices = choices.into_iter().map(Into::into).collect();
        Self::new(name, ParamType::Choice { choices }, description)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn collapse_newlines(mut self) -> Self {
        self.preserve_newlines = false;
        self
    }

    /// A placeholder value of the right shape, used when a schema has no examples.
    pub(crate) fn placeholder(&self) -> Value {
        match &self.kind {
            ParamType::Str => Value::String(format!("<{}>", self.name)),
            ParamType::Int => Value::from(0),
            ParamType::Float => Value::from(0.0),
            ParamType::Bool => Value::Bool(false),
            ParamType::Choice { choices } => choices
                .first()
                .map(|c| Value::String(c.clone()))
                .unwrap_or(Value::Null),
        }
    }
}

/// Flat serde shape of a parameter, as written in TOML / JSON declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawParameter {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_true")]
    required: bool,
    #[serde(default = "default_true")]
    preserve_newlines: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    choices: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl TryFrom<RawParameter> for Parameter {
    type Error = String;

    fn try_from(raw: RawParameter) -> Result<Self, Self::Error> {
        let kind = match raw.kind.to_ascii_lowercase().as_str() {
            "str" | "string" | "text" => ParamType::Str,
            "int" | "integer" => ParamType::Int,
            "float" | "number" => ParamType::Float,
            "bool" | "boolean" => ParamType::Bool,
            "choice" | "enum" => ParamType::Choice {
                choices: raw.choices.clone(),
            },
            other => return Err(format!("parameter '{}': unknown type '{other}'", raw.name)),
        };
        if !matches!(kind, ParamType::Choice { .. }) && !raw.choices.is_empty() {
            return Err(format!(
                "parameter '{}': choices are only allowed on choice parameters",
                raw.name
            ));
        }
        Ok(Self {
            name: raw.name,
            kind,
            description: raw.description,
            required: raw.required,
            preserve_newlines: raw.preserve_newlines,
        })
    }
}

impl From<Parameter> for RawParameter {
    fn from(p: Parameter) -> Self {
        let tag = p.kind.tag().to_string();
        let choices = match p.kind {
            ParamType::Choice { choices } => choices,
            _ => Vec::new(),
        };
        Self {
            name: p.name,
            kind: tag,
            description: p.description,
            required: p.required,
            preserve_newlines: p.preserve_newlines,
            choices,
        }
    }
}

/// A sample invocation: argument name to value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Example {
    pub arguments: Value,
}

impl Example {
    pub fn new(arguments: Value) -> Self {
        Self { arguments }
    }

    pub fn empty() -> Self {
        Self {
            arguments: Value::Object(serde_json::Map::new()),
        }
    }
}

/// A model-invocable function declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub examples: Vec<Example>,
}

impl CallbackSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            examples: Vec::new(),
        }
    }

    /// The built-in "take no action" callback.
    pub fn no_action() -> Self {
        Self::new(NO_ACTION, "Take no action. Use this when nothing needs to change.")
            .example(Value::Object(serde_json::Map::new()))
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn example(mut self, arguments: Value) -> Self {
        self.examples.push(Example::new(arguments));
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn is_no_action(&self) -> bool {
        self.name == NO_ACTION
    }

    /// Declared examples, or a single synthesized one when none are declared.
    pub fn rendered_examples(&self) -> Vec<Example> {
        if !self.examples.is_empty() {
            return self.examples.clone();
        }
        let arguments = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.placeholder()))
            .collect();
        vec![Example::new(Value::Object(arguments))]
    }

    /// Check names, parameters and examples.
    pub fn validate(&self) -> Result<(), FocalError> {
        let invalid = |reason: String| FocalError::InvalidSchema {
            name: self.name.clone(),
            reason,
        };

        if !is_identifier(&self.name) {
            return Err(invalid(format!(
                "callback name '{}' must be an identifier",
                self.name
            )));
        }

        let mut seen: Vec<&str> = Vec::with_capacity(self.parameters.len());
        for p in &self.parameters {
            if !is_identifier(&p.name) {
                return Err(invalid(format!(
                    "parameter name '{}' must be an identifier",
                    p.name
                )));
            }
            if seen.contains(&p.name.as_str()) {
                return Err(invalid(format!("duplicate parameter '{}'", p.name)));
            }
            seen.push(&p.name);

            if let ParamType::Choice { choices } = &p.kind {
                if choices.is_empty() {
                    return Err(invalid(format!("choice parameter '{}' has no choices", p.name)));
                }
                for (i, c) in choices.iter().enumerate() {
                    if choices[..i].iter().any(|o| o.eq_ignore_ascii_case(c)) {
                        return Err(invalid(format!(
                            "choice parameter '{}' repeats '{c}'",
                            p.name
                        )));
                    }
                }
            }
        }

        if self.is_no_action() && !self.parameters.is_empty() {
            return Err(invalid(format!("'{NO_ACTION}' cannot take parameters")));
        }

        self.canonical_examples()?;
        Ok(())
    }

    /// Each declared example as the arguments a reply carrying it parses to:
    /// choices in their declared spelling, numbers in their declared type,
    /// newlines collapsed where the parameter asks for it.
    pub fn canonical_examples(&self) -> Result<Vec<Example>, FocalError> {
        self.examples
            .iter()
            .map(|example| {
                let arguments = crate::parser::check_arguments(self, Some(&example.arguments))
                    .map_err(|failure| FocalError::InvalidExample {
                        name: self.name.clone(),
                        reason: failure.reason,
                    })?;
                Ok(Example::new(Value::Object(
                    arguments
                        .into_iter()
                        .map(|(name, value)| (name, value.to_json()))
                        .collect(),
                )))
            })
            .collect()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
