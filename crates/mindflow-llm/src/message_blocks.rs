use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use mindflow_core::adapter::{BackendAdapter, TurnRequest};
use mindflow_core::errors::GatewayError;
use mindflow_core::ids::ToolCallId;
use mindflow_core::messages::{Content, ContentBlock, Message};
use mindflow_core::stream::{DeltaStream, NormalizedDelta};
use mindflow_core::tools::ToolCall;
use mindflow_settings::BackendSettings;

use crate::convert;
use crate::framing::{sse_data, DecodedStream, LineDecoder, STREAM_IDLE_TIMEOUT};
use crate::http;
use crate::sampling::Sampling;
use crate::tool_parsing::{arguments_to_string, parse_tool_arguments};

const API_VERSION: &str = "2023-06-01";

// ── wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockEvent {
    MessageStart,
    ContentBlockStart { content_block: StartBlock },
    ContentBlockDelta { delta: BlockDelta },
    ContentBlockStop,
    MessageDelta {
        #[serde(default)]
        delta: Option<MessageDeltaBody>,
    },
    MessageStop,
    Ping,
    Error { error: ErrorBody },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StartBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

// ── decoder ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
enum OpenBlock {
    #[default]
    None,
    Text,
    Thinking,
    ToolUse {
        id: String,
        name: String,
        json: String,
        initial: Value,
    },
}

/// Decodes the content-block event stream.
///
/// A tool call is released when its block closes; the closing delta carries
/// a continuation hint if any tool_use block was seen.
#[derive(Debug, Default)]
pub struct MessageBlocksDecoder {
    open: OpenBlock,
    saw_tool_use: bool,
    completed: bool,
}

impl MessageBlocksDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn complete(&mut self) -> NormalizedDelta {
        self.completed = true;
        NormalizedDelta {
            continuation_hint: self.saw_tool_use,
            ..NormalizedDelta::complete(Vec::new())
        }
    }

    fn close_block(&mut self) -> Option<NormalizedDelta> {
        match std::mem::take(&mut self.open) {
            OpenBlock::ToolUse {
                id,
                name,
                json,
                initial,
            } => {
                self.saw_tool_use = true;
                let raw_arguments = if json.trim().is_empty() {
                    arguments_to_string(&initial)
                } else {
                    json
                };
                Some(NormalizedDelta::tool_calls(vec![ToolCall {
                    id: ToolCallId::from_raw(id),
                    name,
                    raw_arguments,
                }]))
            }
            _ => None,
        }
    }
}

impl LineDecoder for MessageBlocksDecoder {
    fn decode_line(&mut self, line: &str) -> Result<Vec<NormalizedDelta>, GatewayError> {
        let Some(data) = sse_data(line) else {
            return Ok(Vec::new());
        };
        if self.completed {
            return Ok(Vec::new());
        }

        let event: BlockEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, preview = %data.chars().take(100).collect::<String>(), "skipping malformed event");
                return Ok(Vec::new());
            }
        };

        let mut out = Vec::new();
        match event {
            BlockEvent::ContentBlockStart { content_block } => {
                if let Some(delta) = self.close_block() {
                    out.push(delta);
                }
                self.open = match content_block {
                    StartBlock::Text { text } => {
                        if !text.is_empty() {
                            out.push(NormalizedDelta::text(text));
                        }
                        OpenBlock::Text
                    }
                    StartBlock::Thinking { thinking } => {
                        if !thinking.is_empty() {
                            out.push(NormalizedDelta::reasoning(thinking));
                        }
                        OpenBlock::Thinking
                    }
                    StartBlock::ToolUse { id, name, input } => OpenBlock::ToolUse {
                        id,
                        name,
                        json: String::new(),
                        initial: input,
                    },
                    StartBlock::Unknown => OpenBlock::None,
                };
            }
            BlockEvent::ContentBlockDelta { delta } => match (&mut self.open, delta) {
                (_, BlockDelta::TextDelta { text }) => out.push(NormalizedDelta::text(text)),
                (_, BlockDelta::ThinkingDelta { thinking }) => {
                    out.push(NormalizedDelta::reasoning(thinking))
                }
                (OpenBlock::ToolUse { json, .. }, BlockDelta::InputJsonDelta { partial_json }) => {
                    json.push_str(&partial_json)
                }
                (_, BlockDelta::InputJsonDelta { .. }) => {
                    warn!("input_json_delta outside a tool_use block, ignoring")
                }
                (_, BlockDelta::Unknown) => {}
            },
            BlockEvent::ContentBlockStop => {
                if let Some(delta) = self.close_block() {
                    out.push(delta);
                }
            }
            BlockEvent::MessageDelta { delta } => {
                if let Some(reason) = delta.and_then(|d| d.stop_reason) {
                    debug!(stop_reason = %reason, "message delta");
                }
            }
            BlockEvent::MessageStop => {
                if let Some(delta) = self.close_block() {
                    out.push(delta);
                }
                out.push(self.complete());
            }
            BlockEvent::Error { error } => return Err(GatewayError::Upstream(error.message)),
            BlockEvent::MessageStart | BlockEvent::Ping | BlockEvent::Unknown => {}
        }
        Ok(out)
    }

    fn finish(&mut self) -> Vec<NormalizedDelta> {
        if self.completed {
            return Vec::new();
        }
        let mut out: Vec<NormalizedDelta> = self.close_block().into_iter().collect();
        out.push(self.complete());
        out
    }
}

// ── adapter ─────────────────────────────────────────────────────────

/// Block-structured backends speaking `/messages`.
pub struct MessageBlocksAdapter {
    name: String,
    settings: BackendSettings,
    api_key: Option<SecretString>,
    client: Client,
    idle_timeout: Duration,
}

impl MessageBlocksAdapter {
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
        let (system, messages) = convert::block_messages(request.messages);
        let mut body = Map::new();
        body.insert("model".into(), json!(self.settings.model));
        body.insert("max_tokens".into(), json!(sampling.max_tokens));
        body.insert("temperature".into(), json!(sampling.temperature));
        body.insert("stream".into(), json!(true));
        if let Some(system) = system {
            body.insert("system".into(), json!(system));
        }
        body.insert("messages".into(), json!(messages));
        if !request.tools.is_empty() {
            body.insert("tools".into(), json!(convert::block_tools(request.tools)));
        }
        Value::Object(body)
    }
}

#[async_trait]
impl BackendAdapter for MessageBlocksAdapter {
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
            .post(http::endpoint(&self.settings.base_url, "messages"))
            .header("anthropic-version", API_VERSION)
            .header("accept", "application/json")
            .header("content-type", "application/json")
            .json(&self.build_body(request));
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key.expose_secret());
        }
        if let Some(limit) = timeout {
            req = req.timeout(limit);
        }

        let resp = http::send(req, timeout).await?;
        Ok(Box::pin(DecodedStream::new(
            resp.bytes_stream(),
            MessageBlocksDecoder::new(),
            self.idle_timeout,
        )))
    }

    fn assistant_message(&self, text: &str, calls: &[ToolCall]) -> Message {
        let mut blocks = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            blocks.push(ContentBlock::Text {
                text: text.to_string(),
            });
        }
        blocks.extend(calls.iter().map(|call| ContentBlock::ToolUse {
            id: call.id.as_str().to_string(),
            name: call.name.clone(),
            input: Value::Object(parse_tool_arguments(&call.raw_arguments, &call.name)),
        }));
        Message::assistant_blocks(blocks)
    }

    fn tool_result_message(&self, call: &ToolCall, result: &Value) -> Message {
        Message::tool(
            call.id.as_str(),
            Content::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: call.id.as_str().to_string(),
                content: result.to_string(),
            }]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use mindflow_core::adapter::ReasoningEffort;
    use mindflow_settings::BackendKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn decode_all(lines: &[&str]) -> Result<Vec<NormalizedDelta>, GatewayError> {
        let mut decoder = MessageBlocksDecoder::new();
        let mut out = Vec::new();
        for line in lines {
            out.extend(decoder.decode_line(line)?);
        }
        out.extend(decoder.finish());
        Ok(out)
    }

    #[test]
    fn text_and_thinking_blocks() {
        let out = decode_all(&[
            "event: message_start",
            r#"data: {"type":"message_start","message":{"id":"msg_1"}}"#,
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
            r#"data: {"type":"content_block_stop","index":0}"#,
            r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"text","text":""}}"#,
            r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"Hi"}}"#,
            r#"data: {"type":"content_block_stop","index":1}"#,
            r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#,
            r#"data: {"type":"message_stop"}"#,
        ])
        .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].reasoning, "hmm");
        assert_eq!(out[1].text, "Hi");
        assert!(out[2].turn_complete);
        assert!(!out[2].continuation_hint);
    }

    #[test]
    fn tool_use_released_at_block_stop() {
        let out = decode_all(&[
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"weather","input":{}}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"city\":"}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"\"Oslo\"}"}}"#,
            r#"data: {"type":"content_block_stop","index":0}"#,
            r#"data: {"type":"message_stop"}"#,
        ])
        .unwrap();
        assert_eq!(out.len(), 2);
        let call = &out[0].finished_tool_calls[0];
        assert_eq!(call.id.as_str(), "toolu_1");
        assert_eq!(call.name, "weather");
        assert_eq!(call.raw_arguments, r#"{"city":"Oslo"}"#);
        assert!(!out[0].turn_complete);
        assert!(out[1].turn_complete);
        assert!(out[1].continuation_hint);
    }

    #[test]
    fn tool_use_without_deltas_uses_start_input() {
        let out = decode_all(&[
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t","name":"now","input":{"tz":"UTC"}}}"#,
            r#"data: {"type":"content_block_stop","index":0}"#,
        ])
        .unwrap();
        assert_eq!(out[0].finished_tool_calls[0].raw_arguments, r#"{"tz":"UTC"}"#);
        assert!(out[1].continuation_hint);
    }

    #[test]
    fn error_frame_is_fatal() {
        let err = decode_all(&[
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"a"}}"#,
            r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        ])
        .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(msg) if msg == "Overloaded"));
    }

    #[test]
    fn malformed_and_unknown_events_skipped() {
        let out = decode_all(&[
            "data: {oops",
            r#"data: {"type":"ping"}"#,
            r#"data: {"type":"brand_new_event"}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"x"}}"#,
        ])
        .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].turn_complete);
    }

    fn settings(base_url: &str) -> BackendSettings {
        BackendSettings {
            kind: BackendKind::MessageBlocks,
            base_url: base_url.into(),
            model: "claude-sonnet-4-20250514".into(),
            api_key_env: Some("ANTHROPIC_API_KEY".into()),
            ..BackendSettings::default()
        }
    }

    #[test]
    fn messages_recorded_as_blocks() {
        let adapter = MessageBlocksAdapter::new("claude", &settings("http://unused"), None).unwrap();
        let call = ToolCall {
            id: ToolCallId::from_raw("toolu_1"),
            name: "weather".into(),
            raw_arguments: r#"{"city":"Oslo"}"#.into(),
        };
        let assistant = adapter.assistant_message("Let me check.", std::slice::from_ref(&call));
        assert_eq!(
            assistant.content,
            Content::Blocks(vec![
                ContentBlock::Text { text: "Let me check.".into() },
                ContentBlock::ToolUse {
                    id: "toolu_1".into(),
                    name: "weather".into(),
                    input: json!({"city": "Oslo"}),
                },
            ])
        );
        assert_eq!(assistant.issued_call_ids(), vec!["toolu_1"]);

        let result = adapter.tool_result_message(&call, &json!({"temp": 3}));
        assert_eq!(result.answered_call_id(), Some("toolu_1"));
        assert!(matches!(
            &result.content,
            Content::Blocks(b) if matches!(&b[0], ContentBlock::ToolResult { content, .. } if content == r#"{"temp":3}"#)
        ));
    }

    #[tokio::test]
    async fn streams_from_server_with_system_lifted() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({"system": "be brief", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = MessageBlocksAdapter::new(
            "claude",
            &settings(&server.uri()),
            Some(SecretString::from("sk-ant")),
        )
        .unwrap();
        let messages = vec![Message::system("be brief"), Message::user("hi")];
        let request = TurnRequest {
            messages: &messages,
            tools: &[],
            reasoning: ReasoningEffort::Medium,
            previous_response_id: None,
        };
        let deltas: Vec<_> = adapter.submit(&request).await.unwrap().collect().await;
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].as_ref().unwrap().text, "Hello");
        assert!(deltas[1].as_ref().unwrap().turn_complete);
    }
}
