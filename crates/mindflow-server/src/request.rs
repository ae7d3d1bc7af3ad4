use serde::Deserialize;

use mindflow_core::adapter::ReasoningEffort;
use mindflow_core::messages::Message;
use mindflow_engine::TurnOptions;

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default = "default_use_tools")]
    pub use_tools: bool,
    #[serde(default)]
    pub reasoning: ReasoningSelection,
    /// Backend name; absent or unknown selects the default backend.
    #[serde(default)]
    pub model_provider: Option<String>,
    #[serde(default)]
    pub avatar_enabled: bool,
    #[serde(default)]
    pub avatar_voice: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasoningSelection {
    #[serde(default)]
    pub effort: ReasoningEffort,
}

fn default_use_tools() -> bool {
    true
}

impl ChatRequest {
    pub fn turn_options(&self) -> TurnOptions {
        TurnOptions {
            tools_enabled: self.use_tools,
            reasoning: self.reasoning.effort,
            avatar_enabled: self.avatar_enabled,
            avatar_voice: self.avatar_voice.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindflow_core::messages::Role;
    use serde_json::json;

    #[test]
    fn defaults() {
        let req: ChatRequest =
            serde_json::from_value(json!({"messages": [{"role": "user", "content": "hi"}]})).unwrap();
        assert!(req.use_tools);
        assert!(!req.avatar_enabled);
        assert_eq!(req.reasoning.effort, ReasoningEffort::Medium);
        assert_eq!(req.model_provider, None);

        let options = req.turn_options();
        assert!(options.tools_enabled);
        assert_eq!(options.avatar_voice, None);
    }

    #[test]
    fn full_request() {
        let req: ChatRequest = serde_json::from_value(json!({
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "content": null,
                 "tool_calls": [{"id": "c1", "name": "weather", "arguments": "{}"}]},
                {"role": "tool", "toolCallId": "c1", "content": "{\"temp\":3}"}
            ],
            "useTools": false,
            "reasoning": {"effort": "high"},
            "modelProvider": "claude",
            "avatarEnabled": true,
            "avatarVoice": "v2"
        }))
        .unwrap();

        assert_eq!(req.messages.len(), 4);
        assert_eq!(req.messages[3].role, Role::Tool);
        assert_eq!(req.messages[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(req.messages[2].tool_calls.len(), 1);
        assert_eq!(req.model_provider.as_deref(), Some("claude"));

        let options = req.turn_options();
        assert!(!options.tools_enabled);
        assert!(options.avatar_enabled);
        assert_eq!(options.reasoning, ReasoningEffort::High);
        assert_eq!(options.avatar_voice.as_deref(), Some("v2"));
    }

    #[test]
    fn unknown_effort_is_rejected() {
        let parsed = serde_json::from_value::<ChatRequest>(json!({
            "messages": [],
            "reasoning": {"effort": "extreme"}
        }));
        assert!(parsed.is_err());
    }
}
