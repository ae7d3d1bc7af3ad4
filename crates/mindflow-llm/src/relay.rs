use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{instrument, warn};

use mindflow_core::adapter::{BackendAdapter, TurnRequest};
use mindflow_core::errors::GatewayError;
use mindflow_core::ids::ToolCallId;
use mindflow_core::stream::{DeltaStream, NormalizedDelta};
use mindflow_core::tools::ToolCall;
use mindflow_settings::BackendSettings;

use crate::convert;
use crate::framing::{DecodedStream, LineDecoder, STREAM_IDLE_TIMEOUT};
use crate::http;
use crate::sampling::Sampling;
use crate::tool_parsing::arguments_to_string;

#[derive(Debug, Deserialize)]
struct RelayRecord {
    #[serde(default)]
    message: Option<RelayMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RelayMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<RelayToolCall>>,
}

#[derive(Debug, Deserialize)]
struct RelayToolCall {
    #[serde(default)]
    id: Option<String>,
    function: RelayFunction,
}

#[derive(Debug, Deserialize)]
struct RelayFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Decodes newline-delimited JSON records from a local relay.
///
/// Tool calls arrive whole and are held until the `done` record.
#[derive(Debug, Default)]
pub struct RelayDecoder {
    calls: Vec<ToolCall>,
    completed: bool,
}

impl RelayDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn complete(&mut self) -> NormalizedDelta {
        self.completed = true;
        NormalizedDelta::complete(std::mem::take(&mut self.calls))
    }
}

impl LineDecoder for RelayDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Vec<NormalizedDelta>, GatewayError> {
        let line = line.trim();
        let payload = line
            .strip_prefix("data:")
            .map(str::trim_start)
            .unwrap_or(line);
        if self.completed || payload.is_empty() || payload.starts_with(':') {
            return Ok(Vec::new());
        }
        if payload == "[DONE]" {
            return Ok(vec![self.complete()]);
        }

        let record: RelayRecord = match serde_json::from_str(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, preview = %payload.chars().take(100).collect::<String>(), "skipping malformed record");
                return Ok(Vec::new());
            }
        };
        if let Some(error) = record.error {
            let message = match error {
                Value::String(s) => s,
                other => other.to_string(),
            };
            return Err(GatewayError::Upstream(message));
        }

        let mut out = Vec::new();
        let message = record.message.unwrap_or_default();
        if let Some(thinking) = message.thinking.filter(|s| !s.is_empty()) {
            out.push(NormalizedDelta::reasoning(thinking));
        }
        if let Some(content) = message.content.filter(|s| !s.is_empty()) {
            out.push(NormalizedDelta::text(content));
        }
        for call in message.tool_calls.unwrap_or_default() {
            if call.function.name.is_empty() {
                warn!("dropping relay tool call without a name");
                continue;
            }
            self.calls.push(ToolCall {
                id: call
                    .id
                    .filter(|s| !s.is_empty())
                    .map_or_else(ToolCallId::new, ToolCallId::from_raw),
                name: call.function.name,
                raw_arguments: arguments_to_string(&call.function.arguments),
            });
        }
        if record.done {
            out.push(self.complete());
        }
        Ok(out)
    }

    fn finish(&mut self) -> Vec<NormalizedDelta> {
        if self.completed {
            return Vec::new();
        }
        vec![self.complete()]
    }
}

/// Local relay speaking `/api/chat` with line-delimited JSON.
pub struct RelayAdapter {
    name: String,
    settings: BackendSettings,
    client: Client,
    idle_timeout: Duration,
}

impl RelayAdapter {
    pub fn new(name: impl Into<String>, settings: &BackendSettings) -> Result<Self, GatewayError> {
        Ok(Self {
            name: name.into(),
            settings: settings.clone(),
            client: http::build_client()?,
            idle_timeout: STREAM_IDLE_TIMEOUT,
        })
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    fn build_body(&self, request: &TurnRequest<'_>) -> Value {
        let sampling = Sampling::for_effort(&self.settings, request.reasoning);
        let mut body = json!({
            "model": self.settings.model,
            "messages": convert::relay_messages(request.messages),
            "stream": true,
            "options": {
                "temperature": sampling.temperature,
                "num_predict": sampling.max_tokens,
            },
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(convert::chat_tools(request.tools));
        }
        body
    }
}

#[async_trait]
impl BackendAdapter for RelayAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    #[instrument(skip(self, request), fields(backend = %self.name, model = %self.settings.model))]
    async fn submit(&self, request: &TurnRequest<'_>) -> Result<DeltaStream, GatewayError> {
        let timeout = self.settings.request_timeout_secs.map(Duration::from_secs);
        let mut req = self
            .client
            .post(http::endpoint(&self.settings.base_url, "api/chat"))
            .header("content-type", "application/json")
            .json(&self.build_body(request));
        if let Some(limit) = timeout {
            req = req.timeout(limit);
        }

        let resp = http::send(req, timeout).await?;
        Ok(Box::pin(DecodedStream::new(
            resp.bytes_stream(),
            RelayDecoder::new(),
            self.idle_timeout,
        )))
    }
}
