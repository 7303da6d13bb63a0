//! JSON extraction: a bounded schema summary instead of the raw payload.
//!
//! The Markdown output documents the document's shape; the payload itself
//! appears only as a size-capped pretty-printed sample.

use quarry_types::{ErrorCode, FetchError};
use serde_json::{Map, Value, json};

use crate::ExtractedContent;

pub const MAX_OBJECT_KEYS: usize = 20;
pub const MAX_ARRAY_SAMPLE: usize = 3;
pub const MAX_STRING_LENGTH: usize = 200;
pub const MAX_DEPTH: usize = 5;
pub const MAX_RAW_SIZE: usize = 5000;

/// Extract a JSON document.
pub fn extract(text: &str) -> Result<ExtractedContent, FetchError> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        FetchError::new(ErrorCode::ExtractionFailed, format!("invalid JSON: {e}"))
    })?;

    let summary = summarize(&value, 0);
    let schema_pretty =
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string());

    let sample_pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
    let (sample, sample_truncated) = truncate_chars(&sample_pretty, MAX_RAW_SIZE);

    let shape = describe_root(&value);
    let mut markdown = format!(
        "# JSON Document\n\n{shape}\n\n## Structure\n\n```json\n{schema_pretty}\n```\n\n## Sample\n\n```json\n{sample}\n```",
    );
    if sample_truncated {
        markdown.push_str("\n\n*Sample truncated.*");
    }

    Ok(ExtractedContent {
        text: sample.clone(),
        markdown,
        ..Default::default()
    })
}

fn describe_root(value: &Value) -> String {
    match value {
        Value::Object(map) => format!("Top-level object with {} keys.", map.len()),
        Value::Array(items) => format!("Top-level array with {} items.", items.len()),
        Value::String(_) => "Top-level string value.".to_string(),
        Value::Number(_) => "Top-level number value.".to_string(),
        Value::Bool(_) => "Top-level boolean value.".to_string(),
        Value::Null => "Top-level null.".to_string(),
    }
}

/// Build the bounded schema summary.
///
/// Objects list at most [`MAX_OBJECT_KEYS`] keys and carry a `count` field
/// only when keys were dropped; arrays always carry their full `count` with
/// at most [`MAX_ARRAY_SAMPLE`] sampled elements.
fn summarize(value: &Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return Value::String("...".to_string());
    }
    match value {
        Value::Null => Value::String("null".to_string()),
        Value::Bool(_) => Value::String("boolean".to_string()),
        Value::Number(_) => Value::String("number".to_string()),
        Value::String(s) => {
            let (shown, truncated) = truncate_chars(s, MAX_STRING_LENGTH);
            if truncated {
                Value::String(format!("{shown}..."))
            } else {
                Value::String(shown)
            }
        }
        Value::Array(items) => {
            let sample: Vec<Value> = items
                .iter()
                .take(MAX_ARRAY_SAMPLE)
                .map(|v| summarize(v, depth + 1))
                .collect();
            json!({
                "type": "array",
                "count": items.len(),
                "sample": sample,
            })
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, val) in map.iter().take(MAX_OBJECT_KEYS) {
                out.insert(key.clone(), summarize(val, depth + 1));
            }
            if map.len() > MAX_OBJECT_KEYS {
                out.insert("count".to_string(), json!(map.len()));
            }
            Value::Object(out)
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> (String, bool) {
    if s.chars().count() <= max {
        (s.to_string(), false)
    } else {
        (s.chars().take(max).collect(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn invalid_json_fails_extraction() {
        let err = extract("{ nope").unwrap_err();
        assert_eq!(err.code, ErrorCode::ExtractionFailed);
    }

    #[test]
    fn array_count_always_present() {
        let summary = summarize(&json!([1, 2, 3, 4, 5]), 0);
        assert_eq!(summary["count"], 5);
        assert_eq!(summary["sample"].as_array().unwrap().len(), MAX_ARRAY_SAMPLE);
    }

    #[test]
    fn object_count_only_when_truncated() {
        let small: Value = json!({"a": 1, "b": 2});
        let summary = summarize(&small, 0);
        assert!(summary.get("count").is_none());

        let mut big = Map::new();
        for i in 0..25 {
            big.insert(format!("key{i:02}"), json!(i));
        }
        let summary = summarize(&Value::Object(big), 0);
        assert_eq!(summary["count"], 25);
        // 20 real keys plus the count marker
        assert_eq!(summary.as_object().unwrap().len(), MAX_OBJECT_KEYS + 1);
    }

    #[test]
    fn long_strings_truncated_in_summary() {
        let long = "x".repeat(500);
        let summary = summarize(&json!(long), 0);
        let shown = summary.as_str().unwrap();
        assert_eq!(shown.chars().count(), MAX_STRING_LENGTH + 3);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn depth_capped() {
        let deep = json!({"a": {"b": {"c": {"d": {"e": {"f": {"g": 1}}}}}}});
        let summary = summarize(&deep, 0);
        let leaf = &summary["a"]["b"]["c"]["d"]["e"]["f"];
        assert_eq!(leaf, &json!("..."));
    }

    #[test]
    fn markdown_documents_structure_not_payload() {
        let doc = r#"{"users": [{"name": "alice", "age": 30}], "total": 1}"#;
        let extracted = extract(doc).unwrap();
        assert!(extracted.markdown.starts_with("# JSON Document"));
        assert!(extracted.markdown.contains("## Structure"));
        assert!(extracted.markdown.contains("## Sample"));
        assert!(extracted.markdown.contains("Top-level object with 2 keys."));
    }

    #[test]
    fn big_sample_truncated() {
        let big: Vec<String> = (0..2000).map(|i| format!("entry number {i}")).collect();
        let doc = serde_json::to_string(&big).unwrap();
        let extracted = extract(&doc).unwrap();
        assert!(extracted.markdown.contains("*Sample truncated.*"));
    }
}
