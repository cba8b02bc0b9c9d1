//! Agent turn: call the model with the composed messages, run any requested tools once,
//! re-submit their results, and post-process the final reply into an assistant `Turn`.
//!
//! A tools-enabled request rejected with "does not support tools" is retried once without
//! tools; the retried response is treated as having no tool calls. Any other failure becomes
//! the visible reply text, so a turn always produces a `Turn`.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::llm::{ChatBackend, ChatMessage, ChatResponse, LlmError, ToolDefinition};
use crate::reply::extract_reasoning;
use crate::session::Turn;
use crate::tools::ToolError;

/// Executes a tool by name with JSON object arguments.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Descriptors advertised to the model when tools are enabled.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run a tool. Names the executor does not provide yield `ToolError::Unknown`.
    async fn execute(&self, name: &str, args: &Map<String, Value>) -> Result<String, ToolError>;
}

/// What the turn is doing right now, for progress display only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Progress {
    #[default]
    Idle,
    Tool(String),
}

/// Everything a turn needs, captured at submission time.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools_enabled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("no model selected")]
    NoModel,
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("tool {name} failed")]
    Tool {
        name: String,
        #[source]
        source: ToolError,
    },
}

/// Run one turn to completion. Errors are rendered into the returned assistant turn.
pub async fn run_turn<B: ChatBackend + ?Sized>(
    backend: &B,
    tools: &dyn ToolExecutor,
    request: TurnRequest,
    on_progress: &(dyn Fn(Progress) + Send + Sync),
) -> Turn {
    match dispatch(backend, tools, request, on_progress).await {
        Ok(raw) => {
            let reply = extract_reasoning(&raw);
            Turn::assistant(reply.content, reply.think_content)
        }
        Err(e) => {
            log::error!("agent: turn failed: {}", e);
            Turn::assistant(format_error(e), None)
        }
    }
}

/// `Error: <message>` followed by the error chain.
fn format_error(e: TurnError) -> String {
    let message = e.to_string();
    let trace = anyhow::Error::new(e);
    format!("Error: {}\n{:?}", message, trace)
}

async fn dispatch<B: ChatBackend + ?Sized>(
    backend: &B,
    tools: &dyn ToolExecutor,
    request: TurnRequest,
    on_progress: &(dyn Fn(Progress) + Send + Sync),
) -> Result<String, TurnError> {
    let model = request.model.trim();
    if model.is_empty() {
        return Err(TurnError::NoModel);
    }
    log::info!("agent: using model {}", model);

    let definitions = if request.tools_enabled {
        Some(tools.definitions())
    } else {
        None
    };
    let (response, advertised) =
        chat_with_fallback(backend, model, request.messages.clone(), definitions.clone()).await?;

    let calls = response.tool_calls().to_vec();
    if calls.is_empty() || !advertised {
        on_progress(Progress::Idle);
        return Ok(response.content().to_string());
    }

    let mut results = Vec::with_capacity(calls.len());
    for call in &calls {
        log::info!("agent: tool call {} {}", call.name, Value::Object(call.arguments.clone()));
        on_progress(Progress::Tool(call.name.clone()));
        let result = match tools.execute(&call.name, &call.arguments).await {
            Ok(output) => output,
            Err(ToolError::Unknown(name)) => {
                log::warn!("agent: model asked for unknown tool {}", name);
                format!("Unknown tool: {}", name)
            }
            Err(source) => {
                return Err(TurnError::Tool {
                    name: call.name.clone(),
                    source,
                })
            }
        };
        results.push(ChatMessage::tool_result(call.name.clone(), result));
    }

    let mut messages = request.messages;
    messages.push(ChatMessage::tool_call_echo(calls));
    messages.extend(results);
    let (response, _) = chat_with_fallback(backend, model, messages, definitions).await?;
    Ok(response.content().to_string())
}

/// Chat, retrying once without tools when the model cannot call them.
/// The flag is true when the response came from a request that advertised tools.
async fn chat_with_fallback<B: ChatBackend + ?Sized>(
    backend: &B,
    model: &str,
    messages: Vec<ChatMessage>,
    tools: Option<Vec<ToolDefinition>>,
) -> Result<(ChatResponse, bool), LlmError> {
    let Some(tools) = tools else {
        return Ok((backend.chat(model, messages, None).await?, false));
    };
    match backend.chat(model, messages.clone(), Some(tools)).await {
        Ok(res) => Ok((res, true)),
        Err(e) if e.is_tools_unsupported() => {
            log::warn!("agent: {} does not support tools, retrying without", model);
            Ok((backend.chat(model, messages, None).await?, false))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_starts_with_message_then_chain() {
        let text = format_error(TurnError::Tool {
            name: "fetch_url_content".to_string(),
            source: ToolError::MissingArgument("url"),
        });
        assert!(text.starts_with("Error: tool fetch_url_content failed\n"));
        assert!(text.contains("missing argument: url"));
    }

    #[test]
    fn progress_defaults_to_idle() {
        assert_eq!(Progress::default(), Progress::Idle);
    }
}
