use crate::conversation::Conversation;

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Mutable state of one turn, owned by the loop that runs it.
#[derive(Debug)]
pub struct OrchestrationState {
    pub conversation: Conversation,
    pub iteration_count: u32,
    pub max_iterations: u32,
    pub should_continue: bool,
    /// Continuation id returned by a stateful backend on the previous round.
    pub carried_session_id: Option<String>,
}

impl OrchestrationState {
    pub fn new(conversation: Conversation, max_iterations: u32) -> Self {
        Self {
            conversation,
            iteration_count: 0,
            max_iterations: max_iterations.max(1),
            should_continue: true,
            carried_session_id: None,
        }
    }

    /// Whether another round may start. The iteration cap applies regardless
    /// of `should_continue`.
    pub fn can_iterate(&self) -> bool {
        self.should_continue && self.iteration_count < self.max_iterations
    }

    /// Start a round, returning its 1-based number.
    pub fn begin_iteration(&mut self) -> u32 {
        self.iteration_count += 1;
        self.iteration_count
    }
}
