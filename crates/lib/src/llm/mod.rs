//! LLM abstraction and Ollama client.
//!
//! `ChatBackend` is the seam the turn pipeline talks to; `OllamaClient` is the real endpoint.

mod ollama;

use async_trait::async_trait;

pub use ollama::{
    normalize_base_url, ChatMessage, ChatResponse, OllamaClient, OllamaModel, ToolCall,
    ToolDefinition, ToolFunctionDefinition, DEFAULT_BASE_URL,
};

/// Error text Ollama returns when the selected model has no function-calling support.
const TOOLS_UNSUPPORTED: &str = "does not support tools";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("ollama request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("ollama api error: {0}")]
    Api(String),
}

impl LlmError {
    /// True when the endpoint rejected a request only because the model cannot call tools.
    pub fn is_tools_unsupported(&self) -> bool {
        self.to_string().contains(TOOLS_UNSUPPORTED)
    }
}

/// A chat-completion endpoint.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_unsupported_is_recognized_from_api_body() {
        let err = LlmError::Api(
            r#"400 Bad Request {"error":"registry.ollama.ai/library/gemma:2b does not support tools"}"#
                .to_string(),
        );
        assert!(err.is_tools_unsupported());
        assert!(!LlmError::Api("500 model not found".to_string()).is_tools_unsupported());
    }
}
