//! # Session Context
//!
//! The data a session analyses. It lives in the sandbox as `context` and
//! only its metadata reaches the model.

use rlm_vm::{convert, Dynamic};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of records or entries shown in a preview
pub const PREVIEW_ITEMS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Context {
    Text(String),
    Records(Vec<Value>),
    Mapping(Map<String, Value>),
}

/// What the system prompt says about a context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextMetadata {
    /// `str`, `list` or `dict`
    pub kind: &'static str,
    /// Characters, elements or keys
    pub size: usize,
    pub preview: String,
}

impl Context {
    pub fn kind(&self) -> &'static str {
        match self {
            Context::Text(_) => "str",
            Context::Records(_) => "list",
            Context::Mapping(_) => "dict",
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Context::Text(text) => text.chars().count(),
            Context::Records(records) => records.len(),
            Context::Mapping(map) => map.len(),
        }
    }

    pub fn metadata(&self, preview_chars: usize) -> ContextMetadata {
        let preview = match self {
            Context::Text(text) => text.chars().take(preview_chars + 1).collect(),
            Context::Records(records) => {
                let head = &records[..records.len().min(PREVIEW_ITEMS)];
                serde_json::to_string(head).unwrap_or_default()
            }
            Context::Mapping(map) => {
                let head: Map<String, Value> = map
                    .iter()
                    .take(PREVIEW_ITEMS)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                serde_json::to_string(&head).unwrap_or_default()
            }
        };
        ContextMetadata {
            kind: self.kind(),
            size: self.size(),
            preview: cap(preview, preview_chars),
        }
    }

    /// The sandbox value bound to `context`
    pub fn to_dynamic(&self) -> Dynamic {
        match self {
            Context::Text(text) => Dynamic::from(text.clone()),
            Context::Records(records) => {
                Dynamic::from_array(records.iter().map(convert::to_dynamic).collect())
            }
            Context::Mapping(map) => convert::to_dynamic(&Value::Object(map.clone())),
        }
    }
}

fn cap(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut capped: String = text.chars().take(max_chars).collect();
    capped.push_str("...");
    capped
}

impl From<&str> for Context {
    fn from(text: &str) -> Self {
        Context::Text(text.to_string())
    }
}

impl From<String> for Context {
    fn from(text: String) -> Self {
        Context::Text(text)
    }
}

impl From<Vec<Value>> for Context {
    fn from(records: Vec<Value>) -> Self {
        Context::Records(records)
    }
}

impl From<Vec<String>> for Context {
    fn from(lines: Vec<String>) -> Self {
        Context::Records(lines.into_iter().map(Value::String).collect())
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Context::Mapping(map)
    }
}

/// Arrays become records, objects mappings, strings text. Other scalars are
/// kept as their JSON text.
impl From<Value> for Context {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Context::Text(text),
            Value::Array(records) => Context::Records(records),
            Value::Object(map) => Context::Mapping(map),
            Value::Null => Context::Text(String::new()),
            other => Context::Text(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_metadata() {
        let ctx = Context::from("abcdefghij");
        let meta = ctx.metadata(4);
        assert_eq!(meta.kind, "str");
        assert_eq!(meta.size, 10);
        assert_eq!(meta.preview, "abcd...");

        assert_eq!(ctx.metadata(200).preview, "abcdefghij");
    }

    #[test]
    fn test_records_metadata() {
        let ctx = Context::from(json!(["a", "b", "c", "d", "e", "f", "g"]));
        let meta = ctx.metadata(200);
        assert_eq!(meta.kind, "list");
        assert_eq!(meta.size, 7);
        assert_eq!(meta.preview, r#"["a","b","c","d","e"]"#);
    }

    #[test]
    fn test_mapping_metadata() {
        let ctx = Context::from(json!({"b": 1, "a": 2, "c": [1, 2, 3]}));
        let meta = ctx.metadata(12);
        assert_eq!(meta.kind, "dict");
        assert_eq!(meta.size, 3);
        assert_eq!(meta.preview, r#"{"b":1,"a":2..."#);
    }

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(Context::from(json!(42)), Context::Text("42".into()));
        assert_eq!(Context::from(json!(null)), Context::Text(String::new()));
        assert_eq!(Context::from(json!("log")), Context::Text("log".into()));
    }

    #[test]
    fn test_untagged_serde() {
        let ctx: Context = serde_json::from_str(r#"[{"level": "ERROR"}]"#).unwrap();
        assert!(matches!(ctx, Context::Records(ref r) if r.len() == 1));
        let ctx: Context = serde_json::from_str(r#""plain""#).unwrap();
        assert_eq!(ctx, Context::Text("plain".into()));
    }

    #[test]
    fn test_long_text_preview() {
        let ctx = Context::from("é".repeat(100_000));
        let meta = ctx.metadata(3);
        assert_eq!(meta.size, 100_000);
        assert_eq!(meta.preview, "ééé...");
        assert_eq!(Context::from("abc").metadata(3).preview, "abc");
    }

    #[test]
    fn test_to_dynamic() {
        let ctx = Context::from(json!([1, "two"]));
        assert!(ctx.to_dynamic().is_array());
        assert!(Context::from("x").to_dynamic().is_string());
        assert!(Context::from(json!({"k": 1})).to_dynamic().is_map());
    }
}
