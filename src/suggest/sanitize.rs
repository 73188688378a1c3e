//! Turns raw model output into a list of [`SuggestionItem`]s.

use super::repair::repair_json;
use crate::error::SuggestError;
use crate::report::SuggestionItem;
use serde_json::Value;

/// Strips a Markdown fence and normalizes the text to a JSON array literal.
///
/// Exactly one leading `[` and one trailing `]` are removed before the body
/// is re-wrapped, so a lone object comes back as a one-element array and an
/// array comes back unchanged.
pub fn sanitize(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the whole fence line, language tag included.
        s = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
        s = s.trim();
        s = s.strip_suffix("```").unwrap_or(s);
    }
    let s = s.trim();
    let s = s.strip_prefix('[').unwrap_or(s);
    let s = s.strip_suffix(']').unwrap_or(s);
    format!("[{s}]")
}

/// Sanitizes, decodes, and on failure repairs and decodes once more.
///
/// The error carries the unmodified response.
pub fn parse_suggestions(raw: &str) -> Result<Vec<SuggestionItem>, SuggestError> {
    let cleaned = sanitize(raw);
    decode(&cleaned)
        .or_else(|_| decode(&repair_json(&cleaned)))
        .map_err(|_| SuggestError::Unparseable {
            raw: raw.to_string(),
        })
}

fn decode(text: &str) -> serde_json::Result<Vec<SuggestionItem>> {
    let values: Vec<Value> = serde_json::from_str(text)?;
    unwrap_envelope(values)
        .into_iter()
        .map(serde_json::from_value)
        .collect()
}

/// Models sometimes answer `{"suggestions": [...]}` or `[[...]]` instead of a
/// bare array.
fn unwrap_envelope(mut values: Vec<Value>) -> Vec<Value> {
    if values.len() != 1 {
        return values;
    }
    if let Value::Array(items) = &mut values[0] {
        return std::mem::take(items);
    }
    if let Value::Object(map) = &mut values[0] {
        if !map.contains_key("issue") {
            for key in ["suggestions", "violations"] {
                if let Some(Value::Array(items)) = map.get_mut(key) {
                    return std::mem::take(items);
                }
            }
        }
    }
    values
}
