//! Reply parser: extracts a single call from free text and coerces its arguments.
//!
//! Grammar:
//! ```text
//! call   = FENCE [ "json" ] NEWLINE object FENCE
//! object = { "function": NAME, "arguments": { NAME: value, ... } }
//! FENCE  = "```"
//! ```
//!
//! An opening fence must start its line. `arguments` may be omitted for
//! callbacks without parameters. Text outside fences is ignored, as are fenced blocks with another info string or a bare
//! fence whose body does not start with `{`.

use regex_lite::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::outcome::{ArgValue, FailureKind, Invocation, Outcome, ParseFailure};
use crate::schema::{CallbackSchema, ParamType, Parameter};

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^[ \t]*```[ \t]*([A-Za-z0-9_+-]*)[^\n]*\n(.*?)```").expect("valid regex")
});

/// Bodies of every fenced block that looks like a call.
pub(crate) fn call_blocks(reply: &str) -> Vec<&str> {
    FENCE_RE
        .captures_iter(reply)
        .filter_map(|caps| {
            let info = caps.get(1).map_or("", |m| m.as_str());
            let body = caps.get(2)?.as_str().trim();
            let is_call = if info.is_empty() {
                body.starts_with('{')
            } else {
                info.eq_ignore_ascii_case("json")
            };
            is_call.then_some(body)
        })
        .collect()
}

/// Parse a reply against a schema lookup.
pub(crate) fn parse_reply<'s>(
    reply: &str,
    lookup: impl Fn(&str) -> Option<&'s CallbackSchema>,
) -> Outcome {
    match parse_inner(reply, lookup) {
        Ok(Some(invocation)) => Outcome::Invocation(invocation),
        Ok(None) => Outcome::NoAction,
        Err(failure) => Outcome::ParseFailure(failure),
    }
}

fn parse_inner<'s>(
    reply: &str,
    lookup: impl Fn(&str) -> Option<&'s CallbackSchema>,
) -> Result<Option<Invocation>, ParseFailure> {
    let blocks = call_blocks(reply);
    let body = match blocks.as_slice() {
        [] => {
            return Err(ParseFailure::new(
                FailureKind::NoCall,
                "no fenced json call block found in the reply",
            ));
        }
        [only] => *only,
        many => {
            return Err(ParseFailure::new(
                FailureKind::Ambiguous,
                format!("found {} call blocks, expected exactly one", many.len()),
            ));
        }
    };

    let value: Value = serde_json::from_str(body).map_err(|e| {
        ParseFailure::new(FailureKind::Malformed, format!("call block is not valid JSON: {e}"))
    })?;
    let Value::Object(mut call) = value else {
        return Err(ParseFailure::new(
            FailureKind::Malformed,
            "call block must be a JSON object",
        ));
    };

    let name = match call.remove("function") {
        Some(Value::String(name)) => name,
        Some(_) => {
            return Err(ParseFailure::new(
                FailureKind::Malformed,
                "\"function\" must be a string",
            ));
        }
        None => {
            return Err(ParseFailure::new(
                FailureKind::Malformed,
                "call block has no \"function\" field",
            ));
        }
    };

    let schema = lookup(&name).ok_or_else(|| {
        ParseFailure::new(
            FailureKind::UnknownCallback,
            format!("'{name}' is not a registered function"),
        )
    })?;

    let arguments = check_arguments(schema, call.get("arguments"))?;

    if schema.is_no_action() {
        return Ok(None);
    }
    Ok(Some(Invocation {
        name: schema.name.clone(),
        arguments,
    }))
}

/// Validate and coerce a raw argument object against a schema.
pub(crate) fn check_arguments(
    schema: &CallbackSchema,
    raw: Option<&Value>,
) -> Result<BTreeMap<String, ArgValue>, ParseFailure> {
    let empty = serde_json::Map::new();
    let raw = match raw {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(ParseFailure::new(
                FailureKind::Malformed,
                "\"arguments\" must be a JSON object",
            ));
        }
    };

    if let Some(extra) = raw.keys().find(|k| schema.parameter(k).is_none()) {
        return Err(ParseFailure::new(
            FailureKind::UnexpectedArgument,
            format!("'{}' does not take an argument named '{extra}'", schema.name),
        ));
    }

    let mut arguments = BTreeMap::new();
    for param in &schema.parameters {
        match raw.get(&param.name) {
            Some(value) if !value.is_null() => {
                let coerced = coerce(param, value).map_err(|reason| {
                    ParseFailure::new(
                        FailureKind::InvalidArgument,
                        format!("argument '{}' of '{}': {reason}", param.name, schema.name),
                    )
                })?;
                arguments.insert(param.name.clone(), coerced);
            }
            _ if param.required => {
                return Err(ParseFailure::new(
                    FailureKind::MissingArgument,
                    format!("'{}' requires argument '{}'", schema.name, param.name),
                ));
            }
            _ => {}
        }
    }
    Ok(arguments)
}

/// Coerce a JSON value to the parameter's declared type.
pub(crate) fn coerce(param: &Parameter, value: &Value) -> Result<ArgValue, String> {
    match &param.kind {
        ParamType::Str => {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => return Err(format!("expected text, got {}", type_name(other))),
            };
            Ok(ArgValue::Text(if param.preserve_newlines {
                text
            } else {
                collapse_newlines(&text)
            }))
        }
        ParamType::Int => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral))
                .map(ArgValue::Integer)
                .ok_or_else(|| format!("{n} is not an integer")),
            Value::String(s) => {
                let t = s.trim();
                t.parse::<i64>()
                    .ok()
                    .or_else(|| t.parse::<f64>().ok().and_then(integral))
                    .map(ArgValue::Integer)
                    .ok_or_else(|| format!("'{s}' is not an integer"))
            }
            other => Err(format!("expected an integer, got {}", type_name(other))),
        },
        ParamType::Float => match value {
            Value::Number(n) => n
                .as_f64()
                .map(ArgValue::Float)
                .ok_or_else(|| format!("{n} is not a number")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(ArgValue::Float)
                .ok_or_else(|| format!("'{s}' is not a number")),
            other => Err(format!("expected a number, got {}", type_name(other))),
        },
        ParamType::Bool => match value {
            Value::Bool(b) => Ok(ArgValue::Bool(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(ArgValue::Bool(true)),
                "false" | "no" => Ok(ArgValue::Bool(false)),
                _ => Err(format!("'{s}' is not a boolean")),
            },
            other => Err(format!("expected a boolean, got {}", type_name(other))),
        },
        ParamType::Choice { choices } => {
            let Value::String(s) = value else {
                return Err(format!("expected one of {choices:?}, got {}", type_name(value)));
            };
            let wanted = s.trim();
            choices
                .iter()
                .find(|c| c.eq_ignore_ascii_case(wanted))
                .map(|c| ArgValue::Choice(c.clone()))
                .ok_or_else(|| format!("'{s}' is not one of {choices:?}"))
        }
    }
}

fn integral(f: f64) -> Option<i64> {
    // 2^63 is the first float above i64::MAX; `as` would saturate it.
    (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < 9_223_372_036_854_775_808.0)
        .then_some(f as i64)
}

fn collapse_newlines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
