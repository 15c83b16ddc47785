//! Field reconciliation: free-form model text → [`CanonicalFields`].
//!
//! Models wrap their JSON in prose ("Here you go: {...}") or markdown
//! fences, and pick their own key names. Reconciliation runs in three steps:
//!
//! 1. Take the outermost `{...}` span, greedy from the first `{` to the last `}`.
//! 2. Parse it as JSON; it must be an object.
//! 3. For each canonical key, take the first non-empty value among its
//!    aliases in [`FIELD_ALIASES`](crate::fields::FIELD_ALIASES) order.
//!
//! Once 1–2 succeed reconciliation cannot fail: an object with no usable
//! keys yields all-null fields, which is a valid result.

use crate::error::IntakeError;
use crate::fields::{scalar_text, CanonicalFields, FieldKey};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

static RE_JSON_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Reconcile raw model text into the canonical schema.
pub fn reconcile(raw: &str) -> Result<CanonicalFields, IntakeError> {
    let span = json_span(raw).ok_or(IntakeError::NoStructuredData)?;
    let object = parse_object(span)?;
    let fields = map_aliases(&object);
    debug!(
        "Reconciled {}/{} fields from {} source keys",
        fields.filled(),
        FieldKey::ALL.len(),
        object.len()
    );
    Ok(fields)
}

/// The outermost `{...}` span, if any.
fn json_span(raw: &str) -> Option<&str> {
    RE_JSON_SPAN.find(raw).map(|m| m.as_str())
}

fn parse_object(span: &str) -> Result<Map<String, Value>, IntakeError> {
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(IntakeError::MalformedJson {
            detail: format!("expected an object, got {}", type_name(&other)),
        }),
        Err(e) => Err(IntakeError::MalformedJson {
            detail: e.to_string(),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Apply the alias table to a parsed object.
pub fn map_aliases(object: &Map<String, Value>) -> CanonicalFields {
    let mut fields = CanonicalFields::default();
    for key in FieldKey::ALL {
        let value = key
            .aliases()
            .iter()
            .find_map(|alias| object.get(*alias).and_then(scalar_text));
        fields.set(key, value);
    }
    fields
}
