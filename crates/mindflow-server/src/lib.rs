pub mod error;
pub mod handlers;
pub mod request;
pub mod server;

pub use error::ApiError;
pub use request::ChatRequest;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
