//! Quasi-JSON normalization and domain-event validation.
//!
//! The concatenated-object stream carries domain events as strings in a
//! Python-literal dictionary syntax (`{'order_id': '1', 'ok': True}`). They
//! are rewritten into strict JSON, parsed, and then shape-checked
//! explicitly. Payloads are never trusted to match the wire shape.
//!
//! The quote substitution is naive: a field value containing an apostrophe
//! turns into invalid JSON and the candidate is rejected.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::models::DomainEvent;
use crate::{AppError, Result};

/// Prefixes that mark a text field as an embedded literal-style object.
pub const DOMAIN_EVENT_SENTINELS: [&str; 2] = ["{'", "{\""];

/// Fields every domain event must carry as non-blank strings.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "order_id",
    "sender",
    "receiver",
    "message",
    "timestamp",
    "state",
];

static LITERAL_TOKENS: LazyLock<[(Regex, &'static str); 3]> = LazyLock::new(|| {
    [
        (literal("True"), "true"),
        (literal("False"), "false"),
        (literal("None"), "null"),
    ]
});

#[allow(clippy::expect_used)] // Patterns are compile-time constants.
fn literal(token: &str) -> Regex {
    Regex::new(&format!(r"\b{token}\b")).expect("literal token pattern is valid")
}

/// Whether `text` should be treated as an embedded domain event.
#[must_use]
pub fn looks_like_domain_event(text: &str) -> bool {
    DOMAIN_EVENT_SENTINELS
        .iter()
        .any(|sentinel| text.starts_with(sentinel))
}

/// Rewrite literal-style syntax into strict JSON spelling.
///
/// Single quotes become double quotes and `True`/`False`/`None` become
/// `true`/`false`/`null`.
#[must_use]
pub fn to_strict_json(text: &str) -> String {
    let mut strict = text.replace('\'', "\"");
    for (pattern, replacement) in LITERAL_TOKENS.iter() {
        strict = pattern.replace_all(&strict, *replacement).into_owned();
    }
    strict
}

/// Normalize and validate a quasi-JSON domain event string.
///
/// # Errors
///
/// - [`AppError::Parse`] — the rewritten text is not valid JSON.
/// - [`AppError::Validation`] — a required field is absent, not a string,
///   or blank.
pub fn normalize_domain_event(text: &str) -> Result<DomainEvent> {
    let strict = to_strict_json(text);
    let value: Value = serde_json::from_str(&strict)
        .map_err(|err| AppError::Parse(format!("quasi-json rejected: {err}")))?;
    validate_domain_event(&value)
}

/// Shape-check a parsed value as a [`DomainEvent`].
///
/// # Errors
///
/// Returns [`AppError::Validation`] naming the first offending field, or
/// stating that the value is not an object.
pub fn validate_domain_event(value: &Value) -> Result<DomainEvent> {
    let Value::Object(fields) = value else {
        return Err(AppError::Validation("domain event must be an object".into()));
    };

    Ok(DomainEvent {
        order_id: required(fields, "order_id")?,
        sender: required(fields, "sender")?,
        receiver: required(fields, "receiver")?,
        message: required(fields, "message")?,
        timestamp: required(fields, "timestamp")?,
        state: required(fields, "state")?,
    })
}

fn required(fields: &Map<String, Value>, name: &str) -> Result<String> {
    match fields.get(name) {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text.clone()),
        Some(Value::String(_)) => Err(AppError::Validation(format!(
            "required field is blank: `{name}`"
        ))),
        Some(_) => Err(AppError::Validation(format!(
            "required field is not a string: `{name}`"
        ))),
        None => Err(AppError::Validation(format!(
            "missing required field: `{name}`"
        ))),
    }
}
