use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::ToolCallId;

/// A backend-requested invocation. Arguments stay unparsed until dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub name: String,
    #[serde(rename = "arguments", default)]
    pub raw_arguments: String,
}

/// Tool definition advertised to the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
}

/// Trait implemented by each tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Map<String, Value>) -> Result<Value, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters_schema: self.parameters_schema(),
        }
    }
}

/// Executes named tool calls for the orchestration loop.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Definitions sent upstream when tools are enabled, sorted by name.
    fn definitions(&self) -> Vec<ToolDefinition>;

    async fn execute(&self, name: &str, args: Map<String, Value>) -> Result<Value, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the arguments back"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
            Ok(Value::Object(args))
        }
    }

    #[test]
    fn definition_from_tool() {
        let def = Echo.to_definition();
        assert_eq!(def.name, "echo");
        assert_eq!(def.description, "Echo the arguments back");
        assert_eq!(def.parameters_schema["type"], "object");
    }

    #[tokio::test]
    async fn tool_executes_with_object_args() {
        let mut args = Map::new();
        args.insert("q".into(), json!("hi"));
        let out = Echo.execute(args).await.unwrap();
        assert_eq!(out, json!({"q": "hi"}));
    }

    #[test]
    fn tool_call_wire_shape() {
        let call: ToolCall =
            serde_json::from_value(json!({"id": "c1", "name": "echo", "arguments": "{}"})).unwrap();
        assert_eq!(call.id.as_str(), "c1");
        assert_eq!(call.raw_arguments, "{}");
    }

    #[test]
    fn tool_error_display() {
        assert_eq!(
            ToolError::NotFound("weather".into()).to_string(),
            "unknown tool: weather"
        );
        assert_eq!(
            ToolError::ExecutionFailed("503".into()).to_string(),
            "execution failed: 503"
        );
    }
}
