//! Response Parsing Module
//!
//! Extracts a JSON array of entities from raw model output. Models wrap
//! their JSON in markdown fences, surround it with prose, return a wrapper
//! object instead of an array, or get cut off by the token limit; each of
//! these is handled here. Failure is a value, never a panic.

use serde_json::{Map, Value};
use thiserror::Error;

/// Why no entities could be extracted from a model response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("model output is empty")]
    Empty,

    #[error("no JSON found in model output")]
    NoJson,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("unexpected JSON shape: {0}")]
    UnexpectedShape(String),
}

/// Describes how a response for one entity kind may be wrapped
#[derive(Debug, Clone, Copy)]
pub struct ResponseShape {
    /// Object keys whose value is the entity array
    pub wrapper_keys: &'static [&'static str],
    /// Keys that mark a bare object as a single entity
    pub entity_keys: &'static [&'static str],
}

pub const EPIC_SHAPE: ResponseShape = ResponseShape {
    wrapper_keys: &["epics", "Epics", "EPICS"],
    entity_keys: &["epic_name", "Epic Name", "epicName", "tasks", "Tasks"],
};

pub const MILESTONE_SHAPE: ResponseShape = ResponseShape {
    wrapper_keys: &["milestones", "Milestones", "MILESTONES"],
    entity_keys: &["name", "Name", "milestone", "milestone_name", "timeline_days"],
};

pub const ALLOCATION_SHAPE: ResponseShape = ResponseShape {
    wrapper_keys: &[
        "allocations",
        "Allocations",
        "assignments",
        "Assignments",
        "tasks",
        "Tasks",
    ],
    entity_keys: &["task_name", "taskName", "assigned_to", "assignedTo", "assignee"],
};

/// Shape used by [`parse`]: unwraps `epics`/`milestones`, wraps any single entity
pub const DEFAULT_SHAPE: ResponseShape = ResponseShape {
    wrapper_keys: &["epics", "Epics", "milestones", "Milestones"],
    entity_keys: &[
        "epic_name",
        "Epic Name",
        "tasks",
        "task_name",
        "taskName",
        "name",
        "Name",
        "timeline_days",
    ],
};

/// Parse raw model output into a list of JSON values using the default shape
pub fn parse(raw: &str) -> Result<Vec<Value>, ParseFailure> {
    parse_with(raw, &DEFAULT_SHAPE)
}

/// Parse raw model output into a list of JSON values
pub fn parse_with(raw: &str, shape: &ResponseShape) -> Result<Vec<Value>, ParseFailure> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::Empty);
    }

    let mut last_failure = ParseFailure::NoJson;
    for candidate in candidates(trimmed) {
        if candidate.is_empty() {
            continue;
        }
        match parse_value(&candidate) {
            Ok(value) => return normalize_shape(value, shape),
            Err(failure) => last_failure = failure,
        }
    }
    Err(last_failure)
}

/// Texts to try, most specific first: fenced block body, then the whole
/// text with fence markers removed
fn candidates(text: &str) -> Vec<String> {
    if !text.contains("```") {
        return vec![text.to_string()];
    }
    let unfenced = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .replace("```", "");
    vec![fenced_body(text).to_string(), unfenced.trim().to_string()]
}

/// Body of the first fenced code block; an unterminated fence runs to the end
fn fenced_body(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let after = &text[start + 3..];

    // Skip a language tag like "json" on the fence line
    let tag_len = after
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after.len());
    let tag_on_own_line = after[tag_len..].starts_with(|c: char| c == '\n' || c == '\r');
    let body = if tag_on_own_line || tag_len == after.len() {
        &after[tag_len..]
    } else {
        after
    };

    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

fn parse_value(text: &str) -> Result<Value, ParseFailure> {
    let direct_err = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let Some(start) = text.find('[') else {
        return parse_object_span(text).ok_or_else(|| {
            if text.contains('{') {
                ParseFailure::Malformed(direct_err.to_string())
            } else {
                ParseFailure::NoJson
            }
        });
    };

    // Greedy span: first '[' to last ']'
    let mut failure = ParseFailure::Malformed(direct_err.to_string());
    if let Some(end) = text.rfind(']') {
        if end > start {
            match serde_json::from_str::<Value>(&text[start..=end]) {
                Ok(value) => return Ok(value),
                Err(e) => failure = ParseFailure::Malformed(e.to_string()),
            }
        }
    }

    // Truncated output: keep the complete leading elements
    for (idx, _) in text.match_indices('[') {
        if let Some(recovered) = recover_truncated_array(&text[idx..]) {
            if let Ok(value) = serde_json::from_str::<Value>(&recovered) {
                log::debug!("Recovered truncated JSON array");
                return Ok(value);
            }
        }
    }

    // Balanced spans, in case prose around the JSON contains brackets
    for (idx, _) in text.match_indices('[') {
        if let Some(span) = balanced_span(&text[idx..]) {
            if let Ok(value) = serde_json::from_str::<Value>(span) {
                return Ok(value);
            }
        }
    }

    parse_object_span(text).ok_or(failure)
}

/// First '{' to last '}', for a lone object surrounded by prose
fn parse_object_span(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Find the bracket-balanced span starting at the '[' at the start of `text`,
/// ignoring brackets inside strings
fn balanced_span(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (idx, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '[' | '{' if !in_string => depth += 1,
            ']' | '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Cut a truncated array after its last element that was followed by a
/// separator, and close it. An element with no trailing comma may itself be
/// cut short, so it is not kept.
fn recover_truncated_array(text: &str) -> Option<String> {
    if !text.starts_with('[') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    let mut committed_end = None;

    for (idx, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '[' | '{' if !in_string => depth += 1,
            ']' | '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    // Balanced after all; nothing to recover
                    return None;
                }
            }
            ',' if !in_string && depth == 1 => committed_end = Some(idx),
            _ => {}
        }
    }

    let end = committed_end?;
    let body = text[..end].trim_end();
    if body == "[" {
        return None;
    }
    Some(format!("{}]", body))
}

/// Turn the parsed value into a list of entities
fn normalize_shape(value: Value, shape: &ResponseShape) -> Result<Vec<Value>, ParseFailure> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(map) => normalize_object(map, shape),
        other => Err(ParseFailure::UnexpectedShape(format!(
            "expected array or object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn normalize_object(
    mut map: Map<String, Value>,
    shape: &ResponseShape,
) -> Result<Vec<Value>, ParseFailure> {
    for key in shape.wrapper_keys {
        if let Some(inner) = map.get(*key) {
            match inner {
                Value::Array(_) | Value::Object(_) => {
                    let inner = map.remove(*key).unwrap_or(Value::Null);
                    return normalize_shape(inner, shape);
                }
                _ => {}
            }
        }
    }

    if shape.entity_keys.iter().any(|k| map.contains_key(*k)) {
        return Ok(vec![Value::Object(map)]);
    }

    // A single unknown key holding an array is still a wrapper
    if map.len() == 1 {
        if let Some((key, Value::Array(items))) = map.into_iter().next() {
            log::debug!("Unwrapping array under unrecognized key '{}'", key);
            return Ok(items);
        }
        return Err(ParseFailure::UnexpectedShape(
            "object without a known wrapper or entity fields".to_string(),
        ));
    }

    Err(ParseFailure::UnexpectedShape(
        "object without a known wrapper or entity fields".to_string(),
    ))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_json() {
        let result = parse("```json\n[{\"a\":1}]\n```").unwrap();
        assert_eq!(result, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_parse_array_in_prose() {
        let result = parse("some text [{\"a\":1},{\"b\":2}] trailing").unwrap();
        assert_eq!(result, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn test_parse_not_json() {
        assert_eq!(parse("not json at all"), Err(ParseFailure::NoJson));
        assert_eq!(parse("   "), Err(ParseFailure::Empty));
    }

    #[test]
    fn test_parse_truncated_keeps_committed_elements() {
        let result = parse("[{\"a\":1},{\"b\":2}").unwrap();
        assert_eq!(result, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_parse_truncated_mid_element() {
        let raw = r#"[{"epic_name":"Auth","tasks":[]},{"epic_name":"Rep"#;
        let result = parse(raw).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["epic_name"], "Auth");
    }

    #[test]
    fn test_parse_truncated_without_complete_element_fails() {
        assert!(matches!(
            parse("[{\"epic_name\": \"Au"),
            Err(ParseFailure::Malformed(_))
        ));
    }

    #[test]
    fn test_unterminated_fence() {
        let result = parse("```json\n[{\"a\":1}]").unwrap();
        assert_eq!(result, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_unwraps_known_wrapper_key() {
        let raw = r#"{"epics": [{"epic_name": "A", "tasks": []}]}"#;
        let result = parse_with(raw, &EPIC_SHAPE).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0]["epic_name"], "A");

        let raw = r#"Here you go: {"milestones": [{"name": "MVP", "timeline_days": 10}]} Enjoy"#;
        let result = parse(raw).unwrap();
        assert_eq!(result[0]["name"], "MVP");
    }

    #[test]
    fn test_wraps_single_entity() {
        let raw = r#"{"name": "Beta", "description": "x", "timeline_days": 30}"#;
        let result = parse_with(raw, &MILESTONE_SHAPE).unwrap();
        assert_eq!(result, vec![json!({"name": "Beta", "description": "x", "timeline_days": 30})]);
    }

    #[test]
    fn test_unknown_single_wrapper_is_unwrapped() {
        let raw = r#"{"plan": [{"epic_name": "A"}]}"#;
        let result = parse_with(raw, &EPIC_SHAPE).unwrap();
        assert_eq!(result[0]["epic_name"], "A");
    }

    #[test]
    fn test_unrecognized_object_is_rejected() {
        let raw = r#"{"foo": 1, "bar": 2}"#;
        assert!(matches!(
            parse_with(raw, &EPIC_SHAPE),
            Err(ParseFailure::UnexpectedShape(_))
        ));
        assert!(matches!(parse("42"), Err(ParseFailure::UnexpectedShape(_))));
    }

    #[test]
    fn test_brackets_inside_strings_do_not_confuse_balanced_scan() {
        let raw = r#"Note [draft]: [{"task_name": "Handle [edge] case"}]"#;
        let result = parse(raw).unwrap();
        assert_eq!(result[0]["task_name"], "Handle [edge] case");
    }

    #[test]
    fn test_fence_with_prose_outside() {
        let raw = "Here is the plan:\n\n```json\n{\"epics\": [{\"epic_name\": \"A\"}]}\n```\nThanks!";
        let result = parse(raw).unwrap();
        assert_eq!(result[0]["epic_name"], "A");
    }
}
