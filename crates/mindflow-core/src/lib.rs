pub mod adapter;
pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod stream;
pub mod tools;

pub use adapter::{BackendAdapter, ReasoningEffort, TurnRequest};
pub use errors::GatewayError;
pub use events::OutboundEvent;
pub use messages::{Content, ContentBlock, Message, Role};
pub use stream::{DeltaStream, NormalizedDelta};
pub use tools::{ToolCall, ToolDefinition, ToolDispatcher, ToolError};
