use mindflow_core::messages::{Message, Role};

use crate::error::EngineError;

/// Ordered, append-only message history for one turn.
#[derive(Clone, Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    seed_len: usize,
}

impl Conversation {
    /// Seed from the inbound messages. `system_prompt` is inserted at the
    /// front when no system message is present.
    pub fn new(mut messages: Vec<Message>, system_prompt: &str) -> Self {
        if !messages.iter().any(|m| m.role == Role::System) {
            messages.insert(0, Message::system(system_prompt));
        }
        let seed_len = messages.len();
        Self { messages, seed_len }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages present before the turn started, including any injected prompt.
    pub fn seed_len(&self) -> usize {
        self.seed_len
    }

    pub fn grew(&self) -> bool {
        self.messages.len() > self.seed_len
    }

    /// Append a message. A tool-role message must answer a call issued by the
    /// latest assistant message.
    pub fn push(&mut self, message: Message) -> Result<(), EngineError> {
        if message.role == Role::Tool {
            let id = message.answered_call_id().ok_or_else(|| {
                EngineError::Conversation("tool message without a tool call id".into())
            })?;
            let issued = self
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::Assistant)
                .is_some_and(|m| m.issued_call_ids().contains(&id));
            if !issued {
                return Err(EngineError::Conversation(format!(
                    "tool result for {id} does not answer the latest assistant message"
                )));
            }
        }
        self.messages.push(message);
        Ok(())
    }

    /// Text of the most recent assistant message, if any.
    pub fn last_assistant_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(Message::text)
    }
}
