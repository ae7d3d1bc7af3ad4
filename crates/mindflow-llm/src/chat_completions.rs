use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{instrument, warn};

use mindflow_core::adapter::{BackendAdapter, TurnRequest};
use mindflow_core::errors::GatewayError;
use mindflow_core::stream::{DeltaStream, NormalizedDelta};
use mindflow_settings::BackendSettings;

use crate::convert;
use crate::framing::{sse_data, DecodedStream, LineDecoder, STREAM_IDLE_TIMEOUT};
use crate::http;
use crate::sampling::Sampling;
use crate::tool_parsing::ToolCallAccumulator;

// ── wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Option<Vec<ChunkChoice>>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallFragment>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallFragment {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionFragment>,
}

#[derive(Debug, Deserialize)]
struct FunctionFragment {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

// ── decoder ─────────────────────────────────────────────────────────

/// Decodes chat-completions SSE chunks.
///
/// Tool call fragments accumulate by index and are released when the
/// backend reports `tool_calls` or `stop`. Any other finish reason drops them.
#[derive(Debug, Default)]
pub struct ChatCompletionsDecoder {
    accumulator: ToolCallAccumulator,
    completed: bool,
}

impl ChatCompletionsDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn close(&mut self, finish_reason: Option<&str>) -> NormalizedDelta {
        self.completed = true;
        match finish_reason {
            Some("tool_calls") | Some("stop") => NormalizedDelta::complete(self.accumulator.finish()),
            other => {
                let dropped = self.accumulator.discard();
                if dropped > 0 {
                    warn!(
                        finish_reason = other.unwrap_or("none"),
                        dropped, "discarding unfinished tool calls"
                    );
                }
                NormalizedDelta::complete(Vec::new())
            }
        }
    }
}

impl LineDecoder for ChatCompletionsDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Vec<NormalizedDelta>, GatewayError> {
        let Some(data) = sse_data(line) else {
            return Ok(Vec::new());
        };
        if self.completed {
            return Ok(Vec::new());
        }
        if data == "[DONE]" {
            return Ok(vec![self.close(None)]);
        }

        let chunk: ChatChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, preview = %data.chars().take(100).collect::<String>(), "skipping malformed chunk");
                return Ok(Vec::new());
            }
        };

        let mut out = Vec::new();
        for choice in chunk.choices.unwrap_or_default() {
            let delta = choice.delta.unwrap_or_default();
            if let Some(reasoning) = delta.reasoning_content.filter(|s| !s.is_empty()) {
                out.push(NormalizedDelta::reasoning(reasoning));
            }
            if let Some(text) = delta.content.filter(|s| !s.is_empty()) {
                out.push(NormalizedDelta::text(text));
            }
            for (position, fragment) in delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
                let function = fragment.function.as_ref();
                self.accumulator.push_fragment(
                    fragment.index.unwrap_or(position),
                    fragment.id.as_deref(),
                    function.and_then(|f| f.name.as_deref()),
                    function.and_then(|f| f.arguments.as_deref()),
                );
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                out.push(self.close(Some(reason)));
                break;
            }
        }
        Ok(out)
    }

    fn finish(&mut self) -> Vec<NormalizedDelta> {
        if self.completed {
            return Vec::new();
        }
        vec![self.close(None)]
    }
}

// ── adapter ─────────────────────────────────────────────────────────

/// Flat-message backends speaking `/chat/completions`.
pub struct ChatCompletionsAdapter {
    name: String,
    settings: BackendSettings,
    api_key: Option<SecretString>,
    client: Client,
    idle_timeout: Duration,
}

impl ChatCompletionsAdapter {
    pub fn new(
        name: impl Into<String>,
        settings: &BackendSettings,
        api_key: Option<SecretString>,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            name: name.into(),
            settings: settings.clone(),
            api_key,
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
        let mut body = Map::new();
        body.insert("model".into(), json!(self.settings.model));
        body.insert("messages".into(), json!(convert::chat_messages(request.messages)));
        body.insert("temperature".into(), json!(sampling.temperature));
        body.insert("max_tokens".into(), json!(sampling.max_tokens));
        body.insert("stream".into(), json!(true));
        if !request.tools.is_empty() {
            body.insert("tools".into(), json!(convert::chat_tools(request.tools)));
            body.insert("tool_choice".into(), json!("auto"));
        }
        Value::Object(body)
    }
}

#[async_trait]
impl BackendAdapter for ChatCompletionsAdapter {
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
            .post(http::endpoint(&self.settings.base_url, "chat/completions"))
            .header("content-type", "application/json")
            .json(&self.build_body(request));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.expose_secret());
        }
        if let Some(limit) = timeout {
            req = req.timeout(limit);
        }

        let resp = http::send(req, timeout).await?;
        Ok(Box::pin(DecodedStream::new(
            resp.bytes_stream(),
            ChatCompletionsDecoder::new(),
            self.idle_timeout,
        )))
    }
}
