use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use serde_json::Value;

use mindflow_core::adapter::{BackendAdapter, ReasoningEffort, TurnRequest};
use mindflow_core::errors::GatewayError;
use mindflow_core::ids::ToolCallId;
use mindflow_core::messages::{Content, ContentBlock, Message};
use mindflow_core::stream::{DeltaStream, NormalizedDelta};
use mindflow_core::tools::ToolCall;

use crate::tool_parsing::parse_tool_arguments;

/// One scripted adapter round.
#[derive(Clone, Debug)]
pub enum MockRound {
    /// Yield these items from the round's stream.
    Deltas(Vec<Result<NormalizedDelta, GatewayError>>),
    /// Fail `submit` itself.
    Fail(GatewayError),
    /// Wait, then play the inner round.
    Delay(Duration, Box<MockRound>),
}

impl MockRound {
    /// A round that streams `text` and completes without tool calls.
    pub fn text(text: &str) -> Self {
        Self::Deltas(vec![
            Ok(NormalizedDelta::text(text)),
            Ok(NormalizedDelta::complete(Vec::new())),
        ])
    }

    /// A round that requests the given `(name, arguments)` tool calls.
    pub fn tool_calls(calls: &[(&str, &str)]) -> Self {
        let calls = calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCall {
                id: ToolCallId::from_raw(format!("call_mock_{i}")),
                name: (*name).to_string(),
                raw_arguments: (*args).to_string(),
            })
            .collect();
        Self::Deltas(vec![Ok(NormalizedDelta::complete(calls))])
    }

    /// A round that streams `text` and then fails mid-stream.
    pub fn error_after(text: &str, error: GatewayError) -> Self {
        Self::Deltas(vec![Ok(NormalizedDelta::text(text)), Err(error)])
    }

    pub fn delayed(delay: Duration, inner: MockRound) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// What the session sent on one round.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
    pub reasoning: ReasoningEffort,
    pub previous_response_id: Option<String>,
}

/// Adapter that plays scripted rounds in order, for tests.
pub struct MockAdapter {
    name: String,
    rounds: Mutex<VecDeque<MockRound>>,
    requests: Mutex<Vec<RecordedRequest>>,
    call_count: AtomicUsize,
    block_shaped: bool,
}

impl MockAdapter {
    pub fn new(rounds: Vec<MockRound>) -> Self {
        Self {
            name: "mock".into(),
            rounds: Mutex::new(rounds.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            block_shaped: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Record tool rounds as content blocks instead of flat messages.
    pub fn block_shaped(mut self) -> Self {
        self.block_shaped = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl BackendAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn submit(&self, request: &TurnRequest<'_>) -> Result<DeltaStream, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(RecordedRequest {
            messages: request.messages.to_vec(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
            reasoning: request.reasoning,
            previous_response_id: request.previous_response_id.map(str::to_string),
        });

        let Some(mut round) = self.rounds.lock().pop_front() else {
            return Err(GatewayError::InvalidRequest(format!(
                "MockAdapter: no response configured for call {idx}"
            )));
        };
        loop {
            match round {
                MockRound::Deltas(items) => return Ok(Box::pin(stream::iter(items))),
                MockRound::Fail(e) => return Err(e),
                MockRound::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    round = *inner;
                }
            }
        }
    }

    fn assistant_message(&self, text: &str, calls: &[ToolCall]) -> Message {
        if !self.block_shaped {
            return Message::assistant_with_tool_calls(text, calls.to_vec());
        }
        let mut blocks = Vec::new();
        if !text.is_empty() {
            blocks.push(ContentBlock::Text {
                text: text.to_string(),
            });
        }
        blocks.extend(calls.iter().map(|c| ContentBlock::ToolUse {
            id: c.id.as_str().to_string(),
            name: c.name.clone(),
            input: Value::Object(parse_tool_arguments(&c.raw_arguments, &c.name)),
        }));
        Message::assistant_blocks(blocks)
    }

    fn tool_result_message(&self, call: &ToolCall, result: &Value) -> Message {
        let content = if self.block_shaped {
            Content::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: call.id.as_str().to_string(),
                content: result.to_string(),
            }])
        } else {
            Content::Text(result.to_string())
        };
        Message::tool(call.id.as_str(), content)
    }
}
