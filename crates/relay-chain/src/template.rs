//! `{{name}}` template markers inside step parameters.
//!
//! Only string leaves and nested objects are visited. Arrays and other
//! scalars are carried through untouched.

use std::collections::HashMap;

use serde_json::Value;

use crate::chain::Params;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Collect every variable name referenced in a parameter tree.
///
/// Names are trimmed, empty and unterminated markers are ignored, and the
/// result is deduplicated in first-seen order.
pub fn extract_variable_refs(params: &Params) -> Vec<String> {
    let mut refs = Vec::new();
    for value in params.values() {
        collect_refs(value, &mut refs);
    }
    refs
}

/// Variable names referenced in a single string.
pub fn extract_from_str(text: &str) -> Vec<String> {
    let mut refs = Vec::new();
    scan_str(text, &mut refs);
    refs
}

fn collect_refs(value: &Value, refs: &mut Vec<String>) {
    match value {
        Value::String(s) => scan_str(s, refs),
        Value::Object(map) => {
            for v in map.values() {
                collect_refs(v, refs);
            }
        }
        _ => {}
    }
}

fn scan_str(mut rest: &str, refs: &mut Vec<String>) {
    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        let name = after_open[..end].trim();
        if !name.is_empty() && !refs.iter().any(|r| r == name) {
            refs.push(name.to_string());
        }
        rest = &after_open[end + CLOSE.len()..];
    }
}

/// Deep-copy a parameter tree, replacing `{{name}}` with its value in every string leaf.
///
/// Matching is exact (no whitespace trimming) and single-pass: text inserted
/// from `values` is never scanned again, so markers inside a value survive verbatim.
pub fn substitute_vars(params: &Params, values: &HashMap<String, String>) -> Params {
    params
        .iter()
        .map(|(k, v)| (k.clone(), substitute_value(v, values)))
        .collect()
}

fn substitute_value(value: &Value, values: &HashMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_str(s, values)),
        Value::Object(map) => Value::Object(substitute_vars(map, values)),
        other => other.clone(),
    }
}

/// Replace known `{{name}}` markers in one string.
pub fn substitute_str(text: &str, values: &HashMap<String, String>) -> String {
    if values.is_empty() || !text.contains(OPEN) {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let replaced = candidate[OPEN.len()..].find(CLOSE).and_then(|end| {
            let name = &candidate[OPEN.len()..OPEN.len() + end];
            values
                .get(name)
                .map(|v| (v, OPEN.len() + end + CLOSE.len()))
        });
        match replaced {
            Some((value, consumed)) => {
                out.push_str(value);
                rest = &candidate[consumed..];
            }
            None => {
                // Not a known marker here; keep one brace and rescan from the next.
                out.push('{');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
