//! Tool call argument parsing and streamed fragment assembly.
//!
//! Arguments arrive as JSON text, sometimes split across many chunks. A call
//! whose arguments cannot be parsed still executes, with an empty object.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use mindflow_core::ids::ToolCallId;
use mindflow_core::tools::ToolCall;

/// Parse tool call arguments into an object. Empty input is `{}`; malformed
/// or non-object JSON is `{}` with a warning.
pub fn parse_tool_arguments(raw: &str, tool_name: &str) -> Map<String, Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Map::new();
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(
                tool_name,
                parsed_type = other.to_string().chars().take(20).collect::<String>(),
                "tool call arguments are not an object, using empty arguments"
            );
            Map::new()
        }
        Err(e) => {
            warn!(
                tool_name,
                error = %e,
                args_preview = trimmed.chars().take(100).collect::<String>(),
                "failed to parse tool call arguments, using empty arguments"
            );
            Map::new()
        }
    }
}

/// Serialize structured arguments the way streamed arguments arrive.
pub fn arguments_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Collects tool call fragments keyed by the position the backend assigns.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a fragment. Id and name are taken from the first fragment that
    /// carries them; argument text is appended.
    pub fn push_fragment(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let entry = self.calls.entry(index).or_default();
        if let Some(id) = id.filter(|s| !s.is_empty()) {
            if entry.id.is_none() {
                entry.id = Some(id.to_string());
            }
        }
        if let Some(name) = name.filter(|s| !s.is_empty()) {
            if entry.name.is_empty() {
                entry.name = name.to_string();
            }
        }
        if let Some(arguments) = arguments {
            entry.arguments.push_str(arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Drain finalized calls in position order. Missing ids are generated;
    /// entries without a name are dropped.
    pub fn finish(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .filter_map(|(index, partial)| {
                if partial.name.is_empty() {
                    warn!(index, "dropping tool call fragment without a name");
                    return None;
                }
                Some(ToolCall {
                    id: partial.id.map_or_else(ToolCallId::new, ToolCallId::from_raw),
                    name: partial.name,
                    raw_arguments: partial.arguments,
                })
            })
            .collect()
    }

    /// Drop partial calls, returning how many there were.
    pub fn discard(&mut self) -> usize {
        let n = self.calls.len();
        self.calls.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_object_arguments() {
        let args = parse_tool_arguments(r#"{"expression": "2+2"}"#, "calculate");
        assert_eq!(args["expression"], "2+2");
    }

    #[test]
    fn empty_and_whitespace_are_empty_objects() {
        assert!(parse_tool_arguments("", "calculate").is_empty());
        assert!(parse_tool_arguments("   ", "calculate").is_empty());
    }

    #[test]
    fn malformed_json_falls_back_to_empty() {
        assert!(parse_tool_arguments(r#"{"expression": "2+"#, "calculate").is_empty());
    }

    #[test]
    fn non_object_json_falls_back_to_empty() {
        assert!(parse_tool_arguments("[1,2,3]", "calculate").is_empty());
        assert!(parse_tool_arguments("\"hello\"", "calculate").is_empty());
    }

    #[test]
    fn arguments_to_string_shapes() {
        assert_eq!(arguments_to_string(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(arguments_to_string(&json!("{\"a\":1}")), r#"{"a":1}"#);
        assert_eq!(arguments_to_string(&Value::Null), "");
    }

    #[test]
    fn accumulates_fragments_in_index_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.push_fragment(1, Some("call_b"), Some("weather"), Some(r#"{"city":"#));
        acc.push_fragment(0, Some("call_a"), Some("calculate"), Some(r#"{"expression""#));
        acc.push_fragment(0, None, None, Some(r#":"1+1"}"#));
        acc.push_fragment(1, None, None, Some(r#""Paris"}"#));

        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id.as_str(), "call_a");
        assert_eq!(calls[0].name, "calculate");
        assert_eq!(calls[0].raw_arguments, r#"{"expression":"1+1"}"#);
        assert_eq!(calls[1].name, "weather");
        assert_eq!(calls[1].raw_arguments, r#"{"city":"Paris"}"#);
        assert!(acc.is_empty());
    }

    #[test]
    fn later_fragments_do_not_rename() {
        let mut acc = ToolCallAccumulator::new();
        acc.push_fragment(0, Some("c1"), Some("search_web"), None);
        acc.push_fragment(0, Some("c2"), Some("other"), Some("{}"));
        let calls = acc.finish();
        assert_eq!(calls[0].id.as_str(), "c1");
        assert_eq!(calls[0].name, "search_web");
    }

    #[test]
    fn missing_id_is_generated_and_nameless_is_dropped() {
        let mut acc = ToolCallAccumulator::new();
        acc.push_fragment(0, None, Some("calculate"), Some("{}"));
        acc.push_fragment(1, Some("c9"), None, Some("{}"));
        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].id.as_str().starts_with("call_"));
    }

    #[test]
    fn discard_reports_count() {
        let mut acc = ToolCallAccumulator::new();
        acc.push_fragment(0, Some("c1"), Some("a"), None);
        acc.push_fragment(3, Some("c2"), Some("b"), None);
        assert_eq!(acc.discard(), 2);
        assert!(acc.is_empty());
        assert!(acc.finish().is_empty());
    }
}
