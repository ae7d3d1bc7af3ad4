use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub server: ServerSettings,
    pub orchestration: OrchestrationSettings,
    /// Provider name used when a request names none or an unknown one.
    pub default_backend: String,
    pub backends: BTreeMap<String, BackendSettings>,
    pub voice: VoiceSettings,
    pub tools: Vec<RemoteToolSettings>,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            orchestration: OrchestrationSettings::default(),
            default_backend: "openai".into(),
            backends: default_backends(),
            voice: VoiceSettings::default(),
            tools: Vec::new(),
            logging: LoggingSettings::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Outbound records buffered per turn before the loop waits on the client.
    pub channel_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            channel_capacity: 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrchestrationSettings {
    pub max_iterations: u32,
    pub tool_timeout_secs: u64,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            tool_timeout_secs: 120,
            system_prompt: None,
        }
    }
}

/// Wire family spoken by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    ChatCompletions,
    MessageBlocks,
    Relay,
    StatefulResponses,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackendSettings {
    pub kind: BackendKind,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// `text.verbosity` for the stateful responses service.
    pub verbosity: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::ChatCompletions,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            temperature: 0.7,
            max_tokens: 16_000,
            verbosity: None,
            request_timeout_secs: None,
        }
    }
}

fn default_backends() -> BTreeMap<String, BackendSettings> {
    let openai = BackendSettings::default();
    let gpt5 = BackendSettings {
        kind: BackendKind::StatefulResponses,
        base_url: "http://localhost:8002".into(),
        model: "gpt-5".into(),
        api_key_env: None,
        ..BackendSettings::default()
    };

    BTreeMap::from([
        ("openai".to_string(), openai.clone()),
        (
            "gpt4-turbo".to_string(),
            BackendSettings {
                model: "gpt-4-turbo".into(),
                temperature: 1.0,
                ..openai.clone()
            },
        ),
        (
            "doubao".to_string(),
            BackendSettings {
                base_url: "https://ark.cn-beijing.volces.com/api/v3".into(),
                model: "doubao-seed-1-6-flash-250828".into(),
                api_key_env: Some("ARK_API_KEY".into()),
                max_tokens: 8_000,
                ..openai.clone()
            },
        ),
        (
            "claude".to_string(),
            BackendSettings {
                kind: BackendKind::MessageBlocks,
                base_url: "https://api.anthropic.com/v1".into(),
                model: "claude-sonnet-4-20250514".into(),
                api_key_env: Some("ANTHROPIC_API_KEY".into()),
                ..openai.clone()
            },
        ),
        (
            "ollama".to_string(),
            BackendSettings {
                kind: BackendKind::Relay,
                base_url: "http://localhost:11434".into(),
                model: "qwen3".into(),
                api_key_env: None,
                max_tokens: 2_000,
                ..openai
            },
        ),
        (
            "gpt5-pro".to_string(),
            BackendSettings {
                verbosity: Some("high".into()),
                ..gpt5.clone()
            },
        ),
        (
            "gpt5-thinking".to_string(),
            BackendSettings {
                verbosity: Some("medium".into()),
                ..gpt5
            },
        ),
    ])
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VoiceSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub default_voice: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".into(),
            timeout_secs: 60,
            default_voice: "zh_female_sajiaonvyou_moon_bigtts".into(),
        }
    }
}

/// A tool served over HTTP: arguments are POSTed as JSON to `endpoint`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteToolSettings {
    pub name: String,
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
    pub endpoint: String,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Per-module overrides, e.g. `{"mindflow_llm": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: true,
            modules: BTreeMap::new(),
        }
    }
}
