use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::GatewayError;
use crate::messages::{Content, Message};
use crate::stream::DeltaStream;
use crate::tools::{ToolCall, ToolDefinition};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Everything an adapter needs for one round.
#[derive(Clone, Copy, Debug)]
pub struct TurnRequest<'a> {
    pub messages: &'a [Message],
    /// Empty when tools are disabled for the turn.
    pub tools: &'a [ToolDefinition],
    pub reasoning: ReasoningEffort,
    /// Continuation id returned by the previous round, if the backend keeps state.
    pub previous_response_id: Option<&'a str>,
}

/// One backend wire protocol behind the shared delta contract.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    /// Submit the conversation and stream back normalized deltas.
    async fn submit(&self, request: &TurnRequest<'_>) -> Result<DeltaStream, GatewayError>;

    /// Assistant message recording a round that requested tools.
    fn assistant_message(&self, text: &str, calls: &[ToolCall]) -> Message {
        Message::assistant_with_tool_calls(text, calls.to_vec())
    }

    /// Tool-role message answering one call.
    fn tool_result_message(&self, call: &ToolCall, result: &Value) -> Message {
        Message::tool(call.id.as_str(), Content::Text(result.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ToolCallId;
    use serde_json::json;

    struct Flat;

    #[async_trait]
    impl BackendAdapter for Flat {
        fn name(&self) -> &str {
            "flat"
        }
        fn model(&self) -> &str {
            "flat-1"
        }
        async fn submit(&self, _request: &TurnRequest<'_>) -> Result<DeltaStream, GatewayError> {
            Err(GatewayError::Cancelled)
        }
    }

    #[test]
    fn effort_serde() {
        let effort: ReasoningEffort = serde_json::from_value(json!("high")).unwrap();
        assert_eq!(effort, ReasoningEffort::High);
        assert_eq!(ReasoningEffort::default(), ReasoningEffort::Medium);
        assert_eq!(ReasoningEffort::Low.as_str(), "low");
    }

    #[test]
    fn default_messages_use_flat_shape() {
        let call = ToolCall {
            id: ToolCallId::from_raw("c7"),
            name: "search_web".into(),
            raw_arguments: "{}".into(),
        };
        let assistant = Flat.assistant_message("", std::slice::from_ref(&call));
        assert_eq!(assistant.tool_calls, vec![call.clone()]);

        let tool = Flat.tool_result_message(&call, &json!({"hits": 3}));
        assert_eq!(tool.tool_call_id.as_deref(), Some("c7"));
        assert_eq!(tool.text(), r#"{"hits":3}"#);
    }
}
