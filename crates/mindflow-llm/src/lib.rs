pub mod catalog;
pub mod chat_completions;
pub mod convert;
pub mod framing;
mod http;
pub mod message_blocks;
pub mod relay;
pub mod responses;
pub mod sampling;
pub mod tool_parsing;

pub mod mock;

pub use catalog::BackendCatalog;
pub use chat_completions::ChatCompletionsAdapter;
pub use message_blocks::MessageBlocksAdapter;
pub use relay::RelayAdapter;
pub use responses::StatefulResponsesAdapter;
pub use tool_parsing::parse_tool_arguments;
