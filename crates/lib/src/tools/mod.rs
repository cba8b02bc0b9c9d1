//! Tool layer: built-in tools the model may call during a turn.

mod builtin;

pub use builtin::{builtin_definitions, BuiltinTools, FETCH_URL_CONTENT, GET_CURRENT_DATE};
pub use crate::agent::ToolExecutor;
pub use crate::llm::ToolDefinition;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("unknown tool: {0}")]
    Unknown(String),
}
