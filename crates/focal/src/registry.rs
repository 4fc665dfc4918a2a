//! The callback registry: an ordered set of schemas with render and parse.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::FocalError;
use crate::outcome::Outcome;
use crate::parser;
use crate::schema::{CallbackSchema, Example, NO_ACTION, ParamType};

/// On-disk declaration file: `[[callbacks]]` tables or `{"callbacks": [...]}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CallbackFile {
    #[serde(default)]
    callbacks: Vec<CallbackSchema>,
}

/// Registered callbacks in registration order.
///
/// The registry holds no per-cycle state; the same registry can render and
/// parse for any number of concurrent cycles.
#[derive(Debug, Clone)]
pub struct CallbackRegistry {
    schemas: Vec<CallbackSchema>,
    by_name: HashMap<String, usize>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    /// A registry holding only the `do_nothing` callback.
    pub fn new() -> Self {
        let no_action = CallbackSchema::no_action();
        let mut by_name = HashMap::new();
        by_name.insert(no_action.name.clone(), 0);
        Self {
            schemas: vec![no_action],
            by_name,
        }
    }

    /// Build a registry from declarations, after `do_nothing`.
    pub fn with_schemas(
        schemas: impl IntoIterator<Item = CallbackSchema>,
    ) -> Result<Self, FocalError> {
        let mut registry = Self::new();
        for schema in schemas {
            registry.register(schema)?;
        }
        Ok(registry)
    }

    /// Load declarations from TOML (`[[callbacks]]` tables).
    pub fn from_toml(toml_str: &str) -> Result<Self, FocalError> {
        let file: CallbackFile = toml::from_str(toml_str)?;
        Self::with_schemas(file.callbacks)
    }

    /// Load declarations from JSON (`{"callbacks": [...]}`).
    pub fn from_json(json: &str) -> Result<Self, FocalError> {
        let file: CallbackFile = serde_json::from_str(json)?;
        Self::with_schemas(file.callbacks)
    }

    /// Add a schema after validating it. Examples are stored in canonical
    /// form so the rendered block shows exactly what a reply parses to.
    pub fn register(&mut self, mut schema: CallbackSchema) -> Result<(), FocalError> {
        if self.by_name.contains_key(&schema.name) {
            return Err(FocalError::DuplicateCallback { name: schema.name });
        }
        schema.validate()?;
        schema.examples = schema.canonical_examples()?;
        tracing::debug!(callback = %schema.name, params = schema.parameters.len(), "Registered callback");
        self.by_name.insert(schema.name.clone(), self.schemas.len());
        self.schemas.push(schema);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CallbackSchema> {
        self.by_name.get(name).map(|&i| &self.schemas[i])
    }

    pub fn schemas(&self) -> &[CallbackSchema] {
        &self.schemas
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Always false: `do_nothing` is registered on construction.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Render the instruction block listing every callback.
    pub fn render(&self) -> String {
        let mut out = String::from(
            "You can respond by calling exactly one of the following functions.\n",
        );
        for schema in &self.schemas {
            out.push('\n');
            render_schema(&mut out, schema);
        }
        let _ = write!(
            out,
            "\nTo call a function, reply with a single fenced json block containing \
             {{\"function\": <name>, \"arguments\": {{...}}}}. Call exactly one function. \
             If nothing needs to be done, call `{NO_ACTION}`."
        );
        out
    }

    /// Parse a model reply into an outcome. Never panics on model output.
    pub fn parse(&self, reply: &str) -> Outcome {
        let outcome = parser::parse_reply(reply, |name| self.get(name));
        match &outcome {
            Outcome::Invocation(inv) => {
                tracing::debug!(callback = %inv.name, args = inv.arguments.len(), "Parsed invocation");
            }
            Outcome::NoAction => tracing::debug!("Parsed no-action reply"),
            Outcome::ParseFailure(f) => {
                tracing::debug!(kind = f.kind.as_str(), reason = %f.reason, "Reply did not parse");
            }
        }
        outcome
    }
}

fn render_schema(out: &mut String, schema: &CallbackSchema) {
    let _ = writeln!(out, "Function: `{}`", schema.name);
    if !schema.description.is_empty() {
        let _ = writeln!(out, "Description: {}", schema.description);
    }
    if schema.parameters.is_empty() {
        out.push_str("Parameters: none\n");
    } else {
        out.push_str("Parameters:\n");
        for p in &schema.parameters {
            let mut tag = p.kind.tag().to_string();
            if let ParamType::Choice { choices } = &p.kind {
                let _ = write!(tag, ": {}", choices.join(" | "));
            }
            if !p.required {
                tag.push_str(", optional");
            }
            let _ = write!(out, "- `{}` ({tag})", p.name);
            if !p.description.is_empty() {
                let _ = write!(out, ": {}", p.description);
            }
            out.push('\n');
        }
    }
    for example in schema.rendered_examples() {
        out.push_str("Example:\n```json\n");
        out.push_str(&render_call(schema, &example));
        out.push_str("\n```\n");
    }
}

/// One call in the wire grammar, with `function` first and arguments in
/// parameter order.
pub fn render_call(schema: &CallbackSchema, example: &Example) -> String {
    let args = match &example.arguments {
        Value::Object(map) => schema
            .parameters
            .iter()
            .filter_map(|p| map.get(&p.name).map(|v| (p.name.as_str(), v)))
            .map(|(k, v)| format!("{}: {}", Value::from(k), v))
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    };
    format!(
        "{{\"function\": {}, \"arguments\": {{{args}}}}}",
        Value::from(schema.name.as_str())
    )
}
