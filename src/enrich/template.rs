//! Follow-up template substitution
//!
//! Rewrites a descriptor against a record: a value that is exactly
//! `%_entity%` becomes the whole record, and `%field%` tokens inside
//! strings become the record's value for `field`. Always works on a copy.

use crate::record::{ActionDescriptor, Record};
use serde_json::{Map, Value};

/// Delimiter around field tokens.
pub const SEPARATOR: char = '%';

/// Sentinel replaced by the entire record.
pub const ENTITY_PATTERN: &str = "%_entity%";

/// Produce a new descriptor with every field rewritten against `record`.
pub fn substitute(record: &Record, action: &ActionDescriptor) -> ActionDescriptor {
    ActionDescriptor::from(substitute_map(record, action.fields()))
}

fn substitute_map(record: &Record, fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), substitute_value(record, value)))
        .collect()
}

/// Rewrite one value. Strings are scanned for tokens, objects and arrays
/// are rewritten element by element, other scalars pass through.
pub fn substitute_value(record: &Record, value: &Value) -> Value {
    match value {
        Value::String(s) if s == ENTITY_PATTERN => Value::Object(record.clone()),
        Value::String(s) => Value::String(substitute_str(record, s)),
        Value::Object(fields) => Value::Object(substitute_map(record, fields)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_value(record, v)).collect()),
        other => other.clone(),
    }
}

/// Replace every `%field%` token whose field is present on the record.
///
/// Tokens naming absent fields are left verbatim.
pub fn substitute_str(record: &Record, template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find(SEPARATOR) {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replacement = after
            .find(SEPARATOR)
            .and_then(|close| record.get(&after[..close]).map(|v| (close, v)));
        match replacement {
            Some((close, value)) => {
                out.push_str(&render(value));
                rest = &after[close + 1..];
            }
            None => {
                // Not a token: keep the delimiter and rescan from the next char
                out.push(SEPARATOR);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Text form of a value inside a template.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
