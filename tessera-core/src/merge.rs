//! Attribute reconciliation.
//!
//! The single primitive used both for folding inbound payloads into canonical
//! data and for computing which properties need change notifications.

use indexmap::IndexMap;
use serde_json::Value;

/// An insertion-ordered mapping of field name to value.
pub type Attributes = IndexMap<String, Value>;

/// Merges `updates` into `target` and returns the keys whose value changed.
///
/// Keys are reported in the iteration order of `updates`. Every key of
/// `updates` is written to `target`, changed or not. When `updates` is
/// absent, nothing is written and the result is empty.
pub fn merge_and_diff(target: &mut Attributes, updates: Option<&Attributes>) -> Vec<String> {
    match updates {
        Some(updates) => merge_pairs(target, updates),
        None => Vec::new(),
    }
}

/// Like [`merge_and_diff`], but takes an untyped payload.
///
/// Anything other than a JSON object is not a mapping and leaves `target`
/// untouched.
pub fn merge_value_and_diff(target: &mut Attributes, updates: Option<&Value>) -> Vec<String> {
    match updates {
        Some(Value::Object(updates)) => merge_pairs(target, updates),
        _ => Vec::new(),
    }
}

fn merge_pairs<'a>(
    target: &mut Attributes,
    updates: impl IntoIterator<Item = (&'a String, &'a Value)>,
) -> Vec<String> {
    let mut changed = Vec::new();
    for (key, value) in updates {
        if target.get(key) != Some(value) {
            changed.push(key.clone());
        }
        target.insert(key.clone(), value.clone());
    }
    changed
}

/// Converts a JSON object into [`Attributes`], preserving key order.
pub fn attributes_from_value(value: Value) -> Option<Attributes> {
    match value {
        Value::Object(map) => Some(map.into_iter().collect()),
        _ => None,
    }
}
