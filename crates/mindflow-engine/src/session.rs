use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{FutureExt, StreamExt};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument, warn};

use mindflow_core::adapter::{BackendAdapter, ReasoningEffort, TurnRequest};
use mindflow_core::errors::GatewayError;
use mindflow_core::events::OutboundEvent;
use mindflow_core::ids::TurnId;
use mindflow_core::messages::Message;
use mindflow_core::tools::{ToolCall, ToolDefinition, ToolDispatcher, ToolError};
use mindflow_llm::parse_tool_arguments;
use mindflow_telemetry::MetricsRecorder;

use crate::conversation::Conversation;
use crate::emitter::EventEmitter;
use crate::error::EngineError;
use crate::state::{OrchestrationState, DEFAULT_MAX_ITERATIONS};
use crate::summarize::{Summarizer, AVATAR_START_TEXT};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-request switches.
#[derive(Clone, Debug)]
pub struct TurnOptions {
    pub tools_enabled: bool,
    pub reasoning: ReasoningEffort,
    pub avatar_enabled: bool,
    pub avatar_voice: Option<String>,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            tools_enabled: true,
            reasoning: ReasoningEffort::Medium,
            avatar_enabled: false,
            avatar_voice: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The backend answered without requesting tools.
    Converged,
    /// Every allowed round requested tools.
    IterationLimit,
    /// A fatal error was reported to the caller.
    Failed(String),
    /// The caller went away.
    Cancelled,
}

#[derive(Debug)]
pub struct TurnSummary {
    pub turn_id: TurnId,
    pub iterations: u32,
    pub outcome: TurnOutcome,
    /// Records written before `Done`.
    pub events: usize,
    pub conversation: Conversation,
}

/// What one backend round produced.
#[derive(Default)]
struct RoundOutput {
    text: String,
    reasoning: String,
    calls: Vec<ToolCall>,
    session_id: Option<String>,
}

/// Runs the tool-calling loop for one turn against a single backend.
pub struct OrchestrationSession {
    adapter: Arc<dyn BackendAdapter>,
    dispatcher: Arc<dyn ToolDispatcher>,
    summarizer: Option<Arc<dyn Summarizer>>,
    metrics: Option<Arc<MetricsRecorder>>,
    max_iterations: u32,
    tool_timeout: Duration,
}

impl OrchestrationSession {
    pub fn new(adapter: Arc<dyn BackendAdapter>, dispatcher: Arc<dyn ToolDispatcher>) -> Self {
        Self {
            adapter,
            dispatcher,
            summarizer: None,
            metrics: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Run one turn to completion, writing every record to `emitter` and
    /// finishing it with `Done` on every exit path.
    pub async fn run(
        &self,
        conversation: Conversation,
        options: TurnOptions,
        emitter: EventEmitter,
    ) -> TurnSummary {
        self.run_turn(TurnId::new(), conversation, options, emitter).await
    }

    #[instrument(
        skip_all,
        fields(turn_id = %turn_id, backend = %self.adapter.name(), tools = options.tools_enabled)
    )]
    async fn run_turn(
        &self,
        turn_id: TurnId,
        conversation: Conversation,
        options: TurnOptions,
        mut emitter: EventEmitter,
    ) -> TurnSummary {
        let backend = self.adapter.name().to_string();
        let tools = if options.tools_enabled {
            self.dispatcher.definitions()
        } else {
            Vec::new()
        };
        let mut state = OrchestrationState::new(conversation, self.max_iterations);
        let mut failure: Option<String> = None;
        let mut cancelled = false;

        'rounds: while state.can_iterate() {
            if emitter.is_closed() {
                cancelled = true;
                break;
            }
            let iteration = state.begin_iteration();
            debug!(iteration, messages = state.conversation.len(), "starting round");

            let round = match self.stream_round(&state, &options, &tools, &mut emitter).await {
                Ok(round) => round,
                Err(e) => {
                    warn!(iteration, kind = e.error_kind(), error = %e, "backend round failed");
                    self.count(
                        "adapter.errors.total",
                        &[("backend", backend.as_str()), ("kind", e.error_kind())],
                    );
                    failure = Some(self.fail(&mut emitter, EngineError::from(e)).await);
                    state.should_continue = false;
                    break;
                }
            };

            if !round.reasoning.is_empty() {
                emitter
                    .emit(OutboundEvent::ReasoningComplete {
                        content: round.reasoning,
                    })
                    .await;
            }
            if let Some(id) = round.session_id {
                state.carried_session_id = Some(id);
            }

            if round.calls.is_empty() || !options.tools_enabled {
                if !round.calls.is_empty() {
                    warn!(
                        calls = round.calls.len(),
                        "backend requested tools while tools are disabled, ignoring"
                    );
                }
                state.should_continue = false;
                if round.text.is_empty() {
                    continue;
                }
                if let Err(e) = state.conversation.push(Message::assistant(round.text)) {
                    failure = Some(self.fail(&mut emitter, e).await);
                }
                continue;
            }

            debug!(iteration, calls = round.calls.len(), "executing tool calls");
            let assistant = self.adapter.assistant_message(&round.text, &round.calls);
            if let Err(e) = state.conversation.push(assistant) {
                failure = Some(self.fail(&mut emitter, e).await);
                state.should_continue = false;
                break;
            }

            for call in &round.calls {
                if emitter.is_closed() {
                    cancelled = true;
                    break 'rounds;
                }
                let args = parse_tool_arguments(&call.raw_arguments, &call.name);
                emitter
                    .emit(OutboundEvent::ToolCall {
                        tool: call.name.clone(),
                        args: Value::Object(args.clone()),
                    })
                    .await;

                let result = self.execute_tool(call, args).await;

                emitter
                    .emit(OutboundEvent::ToolResult {
                        tool: call.name.clone(),
                        result: result.clone(),
                    })
                    .await;
                let reply = self.adapter.tool_result_message(call, &result);
                if let Err(e) = state.conversation.push(reply) {
                    failure = Some(self.fail(&mut emitter, e).await);
                    state.should_continue = false;
                    break 'rounds;
                }
            }
            state.should_continue = true;
        }

        let outcome = match (failure, cancelled) {
            (Some(msg), _) => TurnOutcome::Failed(msg),
            (None, true) => TurnOutcome::Cancelled,
            (None, false) if state.should_continue => {
                warn!(
                    max_iterations = state.max_iterations,
                    "iteration limit reached with tool calls still pending"
                );
                TurnOutcome::IterationLimit
            }
            (None, false) => TurnOutcome::Converged,
        };

        if options.avatar_enabled
            && matches!(outcome, TurnOutcome::Converged | TurnOutcome::IterationLimit)
        {
            self.summarize(&state.conversation, &options, &mut emitter).await;
        }

        self.count("turns.total", &[("backend", backend.as_str())]);
        if let Some(metrics) = &self.metrics {
            metrics.histogram_observe(
                "turn.iterations",
                &[("backend", backend.as_str())],
                f64::from(state.iteration_count),
            );
        }
        info!(iterations = state.iteration_count, outcome = ?outcome, "turn finished");

        let events = emitter.emitted();
        emitter.finish().await;
        TurnSummary {
            turn_id,
            iterations: state.iteration_count,
            outcome,
            events,
            conversation: state.conversation,
        }
    }

    /// Submit the conversation and drain one round, forwarding text as it
    /// arrives.
    async fn stream_round(
        &self,
        state: &OrchestrationState,
        options: &TurnOptions,
        tools: &[ToolDefinition],
        emitter: &mut EventEmitter,
    ) -> Result<RoundOutput, GatewayError> {
        let request = TurnRequest {
            messages: state.conversation.messages(),
            tools,
            reasoning: options.reasoning,
            previous_response_id: state.carried_session_id.as_deref(),
        };
        let mut stream = self.adapter.submit(&request).await?;

        let mut out = RoundOutput::default();
        while let Some(item) = stream.next().await {
            let delta = item?;
            if !delta.text.is_empty() {
                out.text.push_str(&delta.text);
                emitter
                    .emit(OutboundEvent::Content {
                        content: delta.text,
                    })
                    .await;
            }
            out.reasoning.push_str(&delta.reasoning);
            out.calls.extend(delta.finished_tool_calls);
            if delta.session_id.is_some() {
                out.session_id = delta.session_id;
            }
            if delta.turn_complete {
                break;
            }
        }
        Ok(out)
    }

    /// Dispatch one call. Every failure becomes an `{error}` result.
    async fn execute_tool(&self, call: &ToolCall, args: Map<String, Value>) -> Value {
        let start = Instant::now();
        let result = tokio::time::timeout(
            self.tool_timeout,
            AssertUnwindSafe(self.dispatcher.execute(&call.name, args)).catch_unwind(),
        )
        .await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let (value, outcome) = match result {
            Ok(Ok(Ok(value))) => (value, "ok"),
            Ok(Ok(Err(e))) => {
                warn!(tool = %call.name, error = %e, "tool failed");
                (json!({ "error": e.to_string() }), "error")
            }
            Ok(Err(panic)) => {
                let msg = panic_message(&panic);
                error!(tool = %call.name, panic = %msg, "tool panicked during execution");
                (json!({ "error": "Internal error: tool crashed" }), "panic")
            }
            Err(_) => {
                warn!(
                    tool = %call.name,
                    timeout_secs = self.tool_timeout.as_secs(),
                    "tool timed out"
                );
                let err = ToolError::Timeout(self.tool_timeout);
                (json!({ "error": err.to_string() }), "timeout")
            }
        };

        self.count(
            "tools.calls.total",
            &[("tool", call.name.as_str()), ("outcome", outcome)],
        );
        if let Some(metrics) = &self.metrics {
            metrics.histogram_observe("tool.duration_ms", &[("tool", call.name.as_str())], elapsed_ms);
        }
        value
    }

    /// Best-effort voice summary of the final answer. Never fails the turn.
    async fn summarize(
        &self,
        conversation: &Conversation,
        options: &TurnOptions,
        emitter: &mut EventEmitter,
    ) {
        if !conversation.grew() || emitter.is_closed() {
            return;
        }
        let Some(text) = conversation.last_assistant_text().filter(|t| !t.trim().is_empty()) else {
            debug!("no final assistant text, skipping summary");
            return;
        };
        let Some(summarizer) = &self.summarizer else {
            warn!("avatar requested but no voice service is configured");
            emitter
                .emit(OutboundEvent::AvatarError {
                    content: "Avatar service unavailable: not configured".into(),
                })
                .await;
            return;
        };

        emitter
            .emit(OutboundEvent::AvatarStart {
                content: AVATAR_START_TEXT.into(),
            })
            .await;
        let voice = options
            .avatar_voice
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| summarizer.default_voice());

        match summarizer.summarize(&text, voice).await {
            Ok(audio) => {
                self.count("summaries.total", &[("outcome", "ok")]);
                emitter.emit(audio.into()).await;
            }
            Err(e) => {
                warn!(error = %e, "summarization failed");
                self.count("summaries.total", &[("outcome", e.outcome())]);
                emitter.emit(e.into()).await;
            }
        }
    }

    async fn fail(&self, emitter: &mut EventEmitter, err: EngineError) -> String {
        let msg = err.user_message();
        emitter
            .emit(OutboundEvent::Error { error: msg.clone() })
            .await;
        msg
    }

    fn count(&self, name: &str, labels: &[(&str, &str)]) {
        if let Some(metrics) = &self.metrics {
            metrics.counter_inc(name, labels, 1);
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}
