use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::tools::ToolCall;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Flat text for most backends, an ordered block list for the block family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for Content {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Block kinds this service does not interpret (images, documents).
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, deserialize_with = "nullable_content")]
    pub content: Content,
    /// Flat-family tool calls carried by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, alias = "toolCallId", skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

fn nullable_content<'de, D: Deserializer<'de>>(d: D) -> Result<Content, D::Error> {
    Ok(Option::<Content>::deserialize(d)?.unwrap_or_default())
}

// --- Convenience constructors ---

impl Message {
    fn new(role: Role, content: Content) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, Content::Text(text.into()))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::Text(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Content::Text(text.into()))
    }

    /// Assistant turn in the flat shape: text plus a side list of calls.
    pub fn assistant_with_tool_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::assistant(text)
        }
    }

    /// Assistant turn in the block shape.
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::new(Role::Assistant, Content::Blocks(blocks))
    }

    pub fn tool(tool_call_id: impl Into<String>, content: Content) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    /// Concatenated text, ignoring non-text blocks.
    pub fn text(&self) -> String {
        match &self.content {
            Content::Text(text) => text.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Ids of every tool call this message issues, in either shape.
    pub fn issued_call_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tool_calls.iter().map(|c| c.id.as_str()).collect();
        if let Content::Blocks(blocks) = &self.content {
            ids.extend(blocks.iter().filter_map(|b| match b {
                ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                _ => None,
            }));
        }
        ids
    }

    /// The call id a tool-role message answers.
    pub fn answered_call_id(&self) -> Option<&str> {
        if let Some(id) = &self.tool_call_id {
            return Some(id);
        }
        match &self.content {
            Content::Blocks(blocks) => blocks.iter().find_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                _ => None,
            }),
            Content::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ToolCallId;
    use serde_json::json;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: ToolCallId::from_raw(id),
            name: "search_web".into(),
            raw_arguments: r#"{"query":"rust"}"#.into(),
        }
    }

    #[test]
    fn user_text_message() {
        let json = serde_json::to_value(Message::user("hello")).unwrap();
        assert_eq!(json, json!({"role": "user", "content": "hello"}));
    }

    #[test]
    fn parses_inbound_text_and_null_content() {
        let msgs: Vec<Message> = serde_json::from_value(json!([
            {"role": "user", "content": "2+2?"},
            {"role": "assistant", "content": null},
        ]))
        .unwrap();
        assert_eq!(msgs[0].text(), "2+2?");
        assert_eq!(msgs[1].content, Content::Text(String::new()));
    }

    #[test]
    fn parses_block_content_and_skips_unknown_blocks() {
        let msg: Message = serde_json::from_value(json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "look at "},
                {"type": "image", "source": {"data": "..."}},
                {"type": "text", "text": "this"}
            ]
        }))
        .unwrap();
        let Content::Blocks(blocks) = &msg.content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks[1], ContentBlock::Other);
        assert_eq!(msg.text(), "look at this");
    }

    #[test]
    fn accepts_camel_case_tool_call_id() {
        let msg: Message =
            serde_json::from_value(json!({"role": "tool", "content": "{}", "toolCallId": "c1"}))
                .unwrap();
        assert_eq!(msg.answered_call_id(), Some("c1"));
    }

    #[test]
    fn flat_assistant_serializes_tool_calls() {
        let msg = Message::assistant_with_tool_calls("", vec![call("c1")]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["tool_calls"][0]["id"], "c1");
        assert_eq!(json["tool_calls"][0]["arguments"], r#"{"query":"rust"}"#);
        assert_eq!(msg.issued_call_ids(), vec!["c1"]);
    }

    #[test]
    fn block_assistant_issues_tool_use_ids() {
        let msg = Message::assistant_blocks(vec![
            ContentBlock::Text { text: "Checking.".into() },
            ContentBlock::ToolUse {
                id: "toolu_1".into(),
                name: "calculate".into(),
                input: json!({"expression": "2+2"}),
            },
        ]);
        assert_eq!(msg.issued_call_ids(), vec!["toolu_1"]);
        assert_eq!(msg.text(), "Checking.");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"][1]["type"], "tool_use");
    }

    #[test]
    fn tool_result_block_answers_call() {
        let msg = Message {
            tool_call_id: None,
            ..Message::tool(
                "ignored",
                Content::Blocks(vec![ContentBlock::ToolResult {
                    tool_use_id: "toolu_9".into(),
                    content: "4".into(),
                }]),
            )
        };
        assert_eq!(msg.answered_call_id(), Some("toolu_9"));
    }

    #[test]
    fn role_strings() {
        assert_eq!(Role::Tool.as_str(), "tool");
        assert_eq!(serde_json::to_value(Role::System).unwrap(), json!("system"));
    }
}
