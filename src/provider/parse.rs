//! Lenient parsing of model completions into [`RawGeneration`].
//!
//! Accepted shapes, in order of preference:
//!
//! 1. A JSON object, possibly wrapped in a code fence or surrounded by
//!    prose (everything from the first `{` to the last `}` is tried).
//!    Alternate key names `summary` and `key_points` are accepted.
//!    `sources` items may be labels (`"S2"`), snippet numbers, or objects
//!    holding a label or a record reference (`{"note_id": 3}`); other
//!    items are dropped.
//! 2. Plain text. The first sentence of the first non-list line becomes
//!    the one-liner, list-marked lines become bullets, and in answer mode
//!    the whole text is the answer. Inline `[S#]` labels are collected as
//!    sources.
//!
//! Structural limits are not enforced here; that is the normalizer's job.

use serde_json::Value;

use crate::error::FailureReason;
use crate::models::{Mode, RawGeneration};
use crate::text;

const ONE_LINE_KEYS: &[&str] = &["one_line", "summary", "headline"];
const BULLET_KEYS: &[&str] = &["bullets", "key_points", "points"];

pub fn parse_completion(completion: &str, mode: Mode) -> Result<RawGeneration, FailureReason> {
    let trimmed = completion.trim();
    if trimmed.is_empty() {
        return Err(FailureReason::MalformedResponse(
            "empty completion".to_string(),
        ));
    }

    if let Some(obj) = extract_json_object(trimmed) {
        return from_object(&obj, mode);
    }

    Ok(from_plain_text(trimmed, mode))
}

/// First `{` to last `}`, parsed as a JSON object.
fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn string_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        })
}

fn list_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let value = keys.iter().find_map(|k| obj.get(*k));
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        // Some models return a newline-separated string instead of an array.
        Some(Value::String(s)) => s
            .lines()
            .map(text::strip_list_marker)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn sources_field(obj: &serde_json::Map<String, Value>) -> Vec<String> {
    match obj.get("sources") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let label = match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(format!("S{}", n)),
                    Value::Object(o) => source_object(o),
                    _ => None,
                };
                if label.is_none() {
                    tracing::debug!(item = %item, "ignoring unreadable source item");
                }
                label
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(|p| p.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Object items carry either a snippet label (`{"label": "S2"}`,
/// `{"id": 2}`) or a record reference (`{"note_id": 3, "score": 0.9}`),
/// which becomes `note:3`.
fn source_object(item: &serde_json::Map<String, Value>) -> Option<String> {
    for key in ["label", "source", "id", "index"] {
        match item.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(Value::Number(n)) => return Some(format!("S{}", n)),
            _ => {}
        }
    }
    for (key, kind) in [
        ("note_id", "note"),
        ("document_id", "document"),
        ("doc_id", "document"),
    ] {
        match item.get(key) {
            Some(Value::Number(n)) => return Some(format!("{}:{}", kind, n)),
            // Document hits are keyed `doc_<id>` in note-id position.
            Some(Value::String(s)) => {
                let s = s.trim();
                return Some(match s.strip_prefix("doc_") {
                    Some(id) => format!("document:{}", id),
                    None => format!("{}:{}", kind, s),
                });
            }
            _ => {}
        }
    }
    None
}

fn from_object(
    obj: &serde_json::Map<String, Value>,
    mode: Mode,
) -> Result<RawGeneration, FailureReason> {
    let one_line = string_field(obj, ONE_LINE_KEYS);
    let bullets = list_field(obj, BULLET_KEYS);
    let answer = match mode {
        Mode::Answer => string_field(obj, &["answer"]),
        Mode::Summarize => None,
    };

    if one_line.is_none() && bullets.is_empty() && answer.is_none() {
        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        return Err(FailureReason::MalformedResponse(format!(
            "JSON object has no usable fields (keys: {})",
            keys.join(", ")
        )));
    }

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c as f32);

    Ok(RawGeneration {
        one_line,
        bullets,
        answer,
        text: None,
        sources: sources_field(obj),
        confidence,
    })
}

fn from_plain_text(completion: &str, mode: Mode) -> RawGeneration {
    let mut bullets = Vec::new();
    let mut first_prose: Option<&str> = None;
    for line in completion.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }
        if text::is_list_item(line) {
            bullets.push(text::strip_list_marker(line).to_string());
        } else if first_prose.is_none() {
            first_prose = Some(line);
        }
    }

    RawGeneration {
        one_line: first_prose.map(text::first_sentence),
        bullets,
        answer: (mode == Mode::Answer).then(|| completion.to_string()),
        text: Some(completion.to_string()),
        sources: inline_labels(completion),
        confidence: None,
    }
}

/// Collect `[S#]` citation labels in order of first appearance.
fn inline_labels(text: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("[S") {
        let after = &rest[start + 2..];
        let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() && after[digits.len()..].starts_with(']') {
            let label = format!("S{}", digits);
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        rest = after;
    }
    labels
}
