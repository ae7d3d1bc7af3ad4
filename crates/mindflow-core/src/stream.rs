use std::pin::Pin;

use futures::Stream;

use crate::errors::GatewayError;
use crate::tools::ToolCall;

/// One unit of adapter output.
///
/// A round produces zero or more deltas and ends with one whose
/// `turn_complete` is set, or when the stream closes. An `Err` item is fatal
/// to the turn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedDelta {
    pub text: String,
    /// Reasoning fragment; accumulated and emitted once per round.
    pub reasoning: String,
    pub finished_tool_calls: Vec<ToolCall>,
    /// The backend expects tool results before it can answer.
    pub continuation_hint: bool,
    /// Continuation id for backends that keep conversation state.
    pub session_id: Option<String>,
    pub turn_complete: bool,
}

impl NormalizedDelta {
    pub fn text(fragment: impl Into<String>) -> Self {
        Self {
            text: fragment.into(),
            ..Default::default()
        }
    }

    pub fn reasoning(fragment: impl Into<String>) -> Self {
        Self {
            reasoning: fragment.into(),
            ..Default::default()
        }
    }

    /// Closing delta of a round, carrying whatever calls were finalized.
    pub fn complete(calls: Vec<ToolCall>) -> Self {
        Self {
            continuation_hint: !calls.is_empty(),
            finished_tool_calls: calls,
            turn_complete: true,
            ..Default::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            continuation_hint: !calls.is_empty(),
            finished_tool_calls: calls,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
            && self.reasoning.is_empty()
            && self.finished_tool_calls.is_empty()
            && self.session_id.is_none()
            && !self.turn_complete
    }
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<NormalizedDelta, GatewayError>> + Send>>;
