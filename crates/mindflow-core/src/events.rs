use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal record of every outbound stream.
pub const DONE_RECORD: &str = "data: [DONE]\n\n";

/// Records sent to the caller, in emission order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Content {
        content: String,
    },
    ReasoningComplete {
        content: String,
    },
    ToolCall {
        tool: String,
        args: Value,
    },
    ToolResult {
        tool: String,
        result: Value,
    },
    AvatarStart {
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    AvatarAudio {
        audio_base64: String,
        audio_size: u64,
        summary_text: String,
        voice: String,
    },
    AvatarError {
        content: String,
    },
    Error {
        error: String,
    },
    /// Written as the literal `[DONE]` sentinel, never as JSON.
    #[serde(skip)]
    Done,
}

impl OutboundEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::ReasoningComplete { .. } => "reasoning_complete",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::AvatarStart { .. } => "avatar_start",
            Self::AvatarAudio { .. } => "avatar_audio",
            Self::AvatarError { .. } => "avatar_error",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    /// Encode as one `data: <json>` record followed by a blank line.
    pub fn to_wire_record(&self) -> Result<String, serde_json::Error> {
        if let Self::Done = self {
            return Ok(DONE_RECORD.to_string());
        }
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(event: &OutboundEvent) -> Value {
        let record = event.to_wire_record().unwrap();
        let json = record
            .strip_prefix("data: ")
            .and_then(|r| r.strip_suffix("\n\n"))
            .unwrap();
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn content_record() {
        let event = OutboundEvent::Content { content: "4".into() };
        assert_eq!(event.to_wire_record().unwrap(), "data: {\"type\":\"content\",\"content\":\"4\"}\n\n");
    }

    #[test]
    fn tool_records() {
        let call = OutboundEvent::ToolCall {
            tool: "search_web".into(),
            args: json!({"query": "rust"}),
        };
        assert_eq!(
            payload(&call),
            json!({"type": "tool_call", "tool": "search_web", "args": {"query": "rust"}})
        );

        let result = OutboundEvent::ToolResult {
            tool: "search_web".into(),
            result: json!({"error": "boom"}),
        };
        assert_eq!(payload(&result)["result"]["error"], "boom");
    }

    #[test]
    fn avatar_audio_uses_camel_case_fields() {
        let event = OutboundEvent::AvatarAudio {
            audio_base64: "AAAA".into(),
            audio_size: 3,
            summary_text: "short".into(),
            voice: "v1".into(),
        };
        assert_eq!(
            payload(&event),
            json!({
                "type": "avatar_audio",
                "audioBase64": "AAAA",
                "audioSize": 3,
                "summaryText": "short",
                "voice": "v1"
            })
        );
    }

    #[test]
    fn error_and_reasoning_records() {
        let err = OutboundEvent::Error { error: "timeout after 120s".into() };
        assert_eq!(payload(&err), json!({"type": "error", "error": "timeout after 120s"}));

        let reasoning = OutboundEvent::ReasoningComplete { content: "hmm".into() };
        assert_eq!(payload(&reasoning)["type"], "reasoning_complete");
    }

    #[test]
    fn done_is_sentinel() {
        assert_eq!(OutboundEvent::Done.to_wire_record().unwrap(), DONE_RECORD);
        assert_eq!(OutboundEvent::Done.event_type(), "done");
    }

    #[test]
    fn parses_back_for_clients() {
        let event: OutboundEvent =
            serde_json::from_value(json!({"type": "avatar_error", "content": "down"})).unwrap();
        assert_eq!(event, OutboundEvent::AvatarError { content: "down".into() });
    }
}
