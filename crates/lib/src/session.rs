//! Conversation sessions and their turns.
//!
//! `Conversations` owns the ordered session list and the selection, and writes the chat
//! history file after every mutation. It is single-writer: the front-end owns it and applies
//! completed turns to it; workers never touch it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store;

pub const NEW_CHAT_TITLE: &str = "New chat";
const TITLE_WORDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Reasoning extracted from an assistant reply; never sent back to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think_content: Option<String>,
    /// Fields written by older versions (kept verbatim).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            think_content: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, think_content: Option<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            think_content,
            extra: serde_json::Map::new(),
        }
    }
}

/// A titled conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub title: String,
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self {
            title: NEW_CHAT_TITLE.to_string(),
            history: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl ChatSession {
    /// Append a turn; user turns recompute the title from the first user turn.
    pub fn push(&mut self, turn: Turn) {
        let is_user = turn.role == Role::User;
        self.history.push(turn);
        if is_user {
            if let Some(first) = self.history.iter().find(|t| t.role == Role::User) {
                self.title = derive_title(&first.content);
            }
        }
    }
}

/// First six whitespace-separated words joined by single spaces, with "..." when truncated.
pub fn derive_title(content: &str) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    let mut title = words
        .iter()
        .take(TITLE_WORDS)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if words.len() > TITLE_WORDS {
        title.push_str("...");
    }
    title
}

/// Ordered session list with a selected index. Always holds at least one session.
#[derive(Debug)]
pub struct Conversations {
    sessions: Vec<ChatSession>,
    current: usize,
    /// History file; None keeps everything in memory.
    path: Option<PathBuf>,
}

impl Conversations {
    /// Load sessions from the history file, selecting the first one (or a fresh one if none).
    pub fn load(path: PathBuf) -> Self {
        let sessions = store::load_chat_histories(&path);
        log::debug!("session: loaded {} chat(s) from {}", sessions.len(), path.display());
        Self::from_sessions(sessions, Some(path))
    }

    /// Sessions that are never written to disk.
    pub fn in_memory() -> Self {
        Self::from_sessions(Vec::new(), None)
    }

    fn from_sessions(sessions: Vec<ChatSession>, path: Option<PathBuf>) -> Self {
        let mut conversations = Self {
            sessions,
            current: 0,
            path,
        };
        if conversations.sessions.is_empty() {
            conversations.create_session();
        }
        conversations
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &ChatSession {
        &self.sessions[self.current]
    }

    pub fn get(&self, idx: usize) -> Option<&ChatSession> {
        self.sessions.get(idx)
    }

    /// Append an empty session and select it; returns its index.
    pub fn create_session(&mut self) -> usize {
        self.sessions.push(ChatSession::default());
        self.current = self.sessions.len() - 1;
        self.save();
        self.current
    }

    /// Select a session; out-of-range indices are ignored.
    pub fn select_session(&mut self, idx: usize) -> bool {
        if idx >= self.sessions.len() {
            return false;
        }
        self.current = idx;
        true
    }

    /// Append a turn to the given session and persist.
    pub fn append_turn(&mut self, idx: usize, turn: Turn) -> bool {
        let Some(session) = self.sessions.get_mut(idx) else {
            log::warn!("session: append to missing chat {}", idx);
            return false;
        };
        session.push(turn);
        self.save();
        true
    }

    /// Remove a session and re-select a neighbor; the list never ends up empty.
    pub fn delete_session(&mut self, idx: usize) -> bool {
        if idx >= self.sessions.len() {
            return false;
        }
        self.sessions.remove(idx);
        if self.sessions.is_empty() {
            self.create_session();
            return true;
        }
        self.current = idx.min(self.sessions.len() - 1);
        self.save();
        true
    }

    /// Write the history file. Failures are logged and leave the file stale.
    pub fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = store::save_chat_histories(path, &self.sessions) {
            log::error!("session: saving chat histories to {} failed: {:#}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_uses_first_six_words() {
        assert_eq!(derive_title("hello there"), "hello there");
        assert_eq!(
            derive_title("one two three four five six"),
            "one two three four five six"
        );
        assert_eq!(
            derive_title("  one   two three\nfour five six seven "),
            "one two three four five six..."
        );
    }

    #[test]
    fn title_follows_first_user_turn_only() {
        let mut session = ChatSession::default();
        assert_eq!(session.title, NEW_CHAT_TITLE);
        session.push(Turn::user("What is the capital of France exactly?"));
        assert_eq!(session.title, "What is the capital of France...");
        session.push(Turn::assistant("Paris.", None));
        session.push(Turn::user("And of Spain?"));
        assert_eq!(session.title, "What is the capital of France...");
    }

    #[test]
    fn append_preserves_order_and_count() {
        let mut conv = Conversations::in_memory();
        let idx = conv.current_index();
        for i in 0..5 {
            let turn = if i % 2 == 0 {
                Turn::user(format!("u{}", i))
            } else {
                Turn::assistant(format!("a{}", i), None)
            };
            assert!(conv.append_turn(idx, turn));
        }
        let contents: Vec<&str> = conv.current().history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["u0", "a1", "u2", "a3", "u4"]);
        assert!(!conv.append_turn(9, Turn::user("lost")));
    }

    #[test]
    fn starts_with_one_session() {
        let conv = Conversations::in_memory();
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.current().title, NEW_CHAT_TITLE);
    }

    #[test]
    fn create_selects_new_session() {
        let mut conv = Conversations::in_memory();
        let idx = conv.create_session();
        assert_eq!(idx, 1);
        assert_eq!(conv.current_index(), 1);
        assert!(conv.select_session(0));
        assert!(!conv.select_session(2));
        assert_eq!(conv.current_index(), 0);
    }

    #[test]
    fn deleting_last_session_creates_fresh_one() {
        let mut conv = Conversations::in_memory();
        conv.append_turn(0, Turn::user("hi"));
        assert!(conv.delete_session(0));
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.current_index(), 0);
        assert!(conv.current().history.is_empty());
        assert_eq!(conv.current().title, NEW_CHAT_TITLE);
    }

    #[test]
    fn delete_selects_same_index_or_last() {
        let mut conv = Conversations::in_memory();
        conv.create_session();
        conv.create_session();
        conv.append_turn(1, Turn::user("second"));
        conv.append_turn(2, Turn::user("third"));

        conv.select_session(0);
        assert!(conv.delete_session(0));
        assert_eq!(conv.current_index(), 0);
        assert_eq!(conv.current().title, "second");

        assert!(conv.delete_session(1));
        assert_eq!(conv.current_index(), 0);
        assert_eq!(conv.len(), 1);
        assert!(!conv.delete_session(4));
    }

    #[test]
    fn deleting_tail_session_selects_new_last() {
        let mut conv = Conversations::in_memory();
        conv.create_session();
        conv.create_session();
        conv.append_turn(1, Turn::user("middle"));
        assert!(conv.delete_session(2));
        assert_eq!(conv.current_index(), 1);
        assert_eq!(conv.current().title, "middle");
    }

    #[test]
    fn turn_serializes_without_absent_think_content() {
        let v = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(v, serde_json::json!({"role": "user", "content": "hi"}));
        let v = serde_json::to_value(Turn::assistant("ok", Some("hmm".into()))).unwrap();
        assert_eq!(v["think_content"], "hmm");
    }
}
