use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};

use mindflow_core::adapter::{BackendAdapter, TurnRequest};
use mindflow_core::errors::GatewayError;
use mindflow_core::ids::ToolCallId;
use mindflow_core::messages::{Message, Role};
use mindflow_core::stream::{DeltaStream, NormalizedDelta};
use mindflow_core::tools::ToolCall;
use mindflow_settings::BackendSettings;

use crate::convert;
use crate::http;
use crate::tool_parsing::arguments_to_string;

pub const RESPONSES_TIMEOUT: Duration = Duration::from_secs(120);
/// Replayed text slice length, in characters.
pub const SLICE_CHARS: usize = 50;
pub const SLICE_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Default, Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ReplyToolCall>>,
    #[serde(default)]
    web_search_calls: Option<Vec<Value>>,
    #[serde(default)]
    response_id: Option<String>,
}

/// Either `{id, name, arguments}` or the nested `{id, function: {name, arguments}}`.
#[derive(Debug, Deserialize)]
struct ReplyToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
    #[serde(default)]
    function: Option<ReplyFunction>,
}

#[derive(Debug, Deserialize)]
struct ReplyFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

impl ReplyToolCall {
    fn into_tool_call(self) -> Option<ToolCall> {
        let (fn_name, fn_args) = match self.function {
            Some(f) => (f.name, f.arguments),
            None => (None, None),
        };
        let name = self.name.or(fn_name).filter(|n| !n.is_empty())?;
        let arguments = self.arguments.or(fn_args).unwrap_or(Value::Null);
        Some(ToolCall {
            id: self
                .id
                .filter(|s| !s.is_empty())
                .map_or_else(ToolCallId::new, ToolCallId::from_raw),
            name,
            raw_arguments: arguments_to_string(&arguments),
        })
    }
}

/// Split text into slices of at most `size` characters.
pub fn char_slices(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

/// Messages to send for a round: everything on the first round, only what
/// follows the last assistant message once a continuation id exists.
fn round_input<'a>(messages: &'a [Message], previous_response_id: Option<&str>) -> &'a [Message] {
    if previous_response_id.is_none() {
        return messages;
    }
    match messages.iter().rposition(|m| m.role == Role::Assistant) {
        Some(last) => &messages[last + 1..],
        None => messages,
    }
}

/// Stateful service answering `/api/responses` with one JSON document per round.
pub struct StatefulResponsesAdapter {
    name: String,
    settings: BackendSettings,
    client: Client,
    timeout: Duration,
    slice_interval: Duration,
}

impl StatefulResponsesAdapter {
    pub fn new(name: impl Into<String>, settings: &BackendSettings) -> Result<Self, GatewayError> {
        Ok(Self {
            name: name.into(),
            settings: settings.clone(),
            client: http::build_client()?,
            timeout: RESPONSES_TIMEOUT,
            slice_interval: SLICE_INTERVAL,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_body(&self, request: &TurnRequest<'_>) -> Value {
        let input = round_input(request.messages, request.previous_response_id);
        let mut body = Map::new();
        body.insert("model".into(), json!(self.settings.model));
        body.insert("input".into(), json!(convert::chat_messages(input)));
        body.insert("reasoning".into(), json!({ "effort": request.reasoning.as_str() }));
        if let Some(verbosity) = &self.settings.verbosity {
            body.insert("text".into(), json!({ "verbosity": verbosity }));
        }
        if !request.tools.is_empty() {
            body.insert("tools".into(), json!(convert::responses_tools(request.tools)));
            body.insert("tool_choice".into(), json!("auto"));
        }
        body.insert("previous_response_id".into(), json!(request.previous_response_id));
        convert::without_nulls(body)
    }
}

#[async_trait]
impl BackendAdapter for StatefulResponsesAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.settings.model
    }

    #[instrument(skip(self, request), fields(backend = %self.name, model = %self.settings.model))]
    async fn submit(&self, request: &TurnRequest<'_>) -> Result<DeltaStream, GatewayError> {
        let req = self
            .client
            .post(http::endpoint(&self.settings.base_url, "api/responses"))
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(&self.build_body(request));

        let resp = http::send(req, Some(self.timeout)).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| http::map_transport_error(e, Some(self.timeout)))?;
        let reply: ResponsesReply = serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::Upstream(format!("invalid responses payload: {e}")))?;

        if let Some(searches) = reply.web_search_calls.as_ref().filter(|s| !s.is_empty()) {
            debug!(count = searches.len(), "backend ran web searches");
        }
        if reply.response_id.is_none() {
            warn!("responses reply carried no response_id");
        }

        let calls: Vec<ToolCall> = reply
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| {
                let call = c.into_tool_call();
                if call.is_none() {
                    warn!("dropping responses tool call without a name");
                }
                call
            })
            .collect();
        let reasoning = reply.reasoning_content.unwrap_or_default();
        let slices = char_slices(&reply.output_text.unwrap_or_default(), SLICE_CHARS);
        let session_id = reply.response_id;
        let interval = self.slice_interval;

        let stream = async_stream::stream! {
            if !reasoning.is_empty() {
                yield Ok::<_, GatewayError>(NormalizedDelta::reasoning(reasoning));
            }
            let last = slices.len().saturating_sub(1);
            for (i, slice) in slices.into_iter().enumerate() {
                yield Ok::<_, GatewayError>(NormalizedDelta::text(slice));
                if i < last {
                    tokio::time::sleep(interval).await;
                }
            }
            yield Ok::<_, GatewayError>(NormalizedDelta {
                session_id,
                ..NormalizedDelta::complete(calls)
            });
        };
        Ok(Box::pin(stream))
    }
}
