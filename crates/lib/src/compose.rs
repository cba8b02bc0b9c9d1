//! Outbound message list for one turn: priming entries, the profile prefix, then the history.

use crate::llm::ChatMessage;
use crate::session::Turn;

/// Control entry some model families read as "enable thinking mode"; others ignore it.
const THINKING_CONTROL: (&str, &str) = ("control", "thinking");
const DEEP_THINKING_HINT: &str = "Enable deep thinking subroutine.";

/// Build the messages for a chat request. `think_content` is never sent back to the model.
pub fn compose_messages(history: &[Turn], prefix: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(ChatMessage::new(THINKING_CONTROL.0, THINKING_CONTROL.1));
    messages.push(ChatMessage::system(DEEP_THINKING_HINT));
    messages.push(ChatMessage::system(prefix));
    messages.extend(
        history
            .iter()
            .map(|t| ChatMessage::new(t.role.as_str(), t.content.clone())),
    );
    messages
}
