//! # mindflow-engine
//!
//! The orchestration loop: one [`OrchestrationSession`] turn drives a
//! backend adapter through tool rounds, writes every outbound record through
//! an [`EventEmitter`] and, when asked, finishes with a voice summary.

pub mod conversation;
pub mod emitter;
pub mod error;
pub mod prompt;
pub mod registry;
pub mod remote;
pub mod session;
pub mod state;
pub mod summarize;

pub use conversation::Conversation;
pub use emitter::EventEmitter;
pub use error::EngineError;
pub use prompt::DEFAULT_SYSTEM_PROMPT;
pub use registry::ToolRegistry;
pub use remote::RemoteTool;
pub use session::{OrchestrationSession, TurnOptions, TurnOutcome, TurnSummary};
pub use state::OrchestrationState;
pub use summarize::{AvatarAudio, SummarizationError, Summarizer, VoiceClient};
