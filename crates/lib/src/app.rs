//! Application state shared by the front-ends: config, conversations, known models, and the
//! one outstanding turn. Owned by the presentation thread; every mutation is persisted.

use std::path::{Path, PathBuf};

use crate::agent::TurnRequest;
use crate::compose::compose_messages;
use crate::config::{self, Config};
use crate::session::{Conversations, Turn};
use crate::worker::TurnJob;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("message is empty")]
    Empty,
    #[error("a reply is still pending")]
    Busy,
}

/// Where the outstanding turn's reply goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Session(usize),
    /// The session was deleted; the reply is dropped.
    Orphaned,
}

pub struct AppState {
    config: Config,
    /// None for in-memory state (tests).
    config_path: Option<PathBuf>,
    conversations: Conversations,
    models: Vec<String>,
    pending: Option<Pending>,
}

impl AppState {
    /// Load config and chat histories from disk (the default locations when `config_path` is None).
    pub fn open(config_path: Option<PathBuf>) -> Self {
        let (config, path) = config::load_config(config_path);
        let conversations = Conversations::load(config::history_path(&path));
        Self {
            config,
            config_path: Some(path),
            conversations,
            models: Vec::new(),
            pending: None,
        }
    }

    pub fn in_memory(mut config: Config) -> Self {
        config.normalize();
        Self {
            config,
            config_path: None,
            conversations: Conversations::in_memory(),
            models: Vec::new(),
            pending: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn conversations(&self) -> &Conversations {
        &self.conversations
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Session the outstanding turn will be appended to.
    pub fn pending_session(&self) -> Option<usize> {
        match self.pending {
            Some(Pending::Session(idx)) => Some(idx),
            _ => None,
        }
    }

    /// Write the config file. Failures are logged and leave the file stale.
    pub fn save_config(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        if let Err(e) = config::save_config(&self.config, path) {
            log::error!("app: saving config to {} failed: {:#}", path.display(), e);
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Record the models the server reported.
    pub fn set_models(&mut self, models: Vec<String>) {
        self.models = models;
    }

    /// Configured model if set, else the first model the server listed.
    pub fn effective_model(&self) -> Option<String> {
        self.config
            .selected_model
            .as_ref()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .or_else(|| self.models.first().cloned())
    }

    pub fn set_model(&mut self, model: &str) {
        let model = model.trim();
        self.config.selected_model = if model.is_empty() {
            None
        } else {
            Some(model.to_string())
        };
        self.save_config();
    }

    pub fn set_tools(&mut self, tools: &str) {
        self.config.tools = tools.to_string();
        self.save_config();
    }

    pub fn select_profile(&mut self, idx: usize) -> bool {
        let changed = self.config.select_profile(idx);
        if changed {
            self.save_config();
        }
        changed
    }

    pub fn add_profile(&mut self) -> usize {
        let idx = self.config.add_profile();
        self.save_config();
        idx
    }

    pub fn update_profile(&mut self, idx: usize, name: &str, prefix: &str) -> bool {
        let changed = self.config.update_profile(idx, name, prefix);
        if changed {
            self.save_config();
        }
        changed
    }

    pub fn remove_profile(&mut self, idx: usize) -> bool {
        let changed = self.config.remove_profile(idx);
        if changed {
            self.save_config();
        }
        changed
    }

    pub fn create_session(&mut self) -> usize {
        self.conversations.create_session()
    }

    pub fn select_session(&mut self, idx: usize) -> bool {
        self.conversations.select_session(idx)
    }

    /// Delete a session. A pending reply follows its session; if that session is the one
    /// deleted, the reply is discarded when it arrives.
    pub fn delete_session(&mut self, idx: usize) -> bool {
        if !self.conversations.delete_session(idx) {
            return false;
        }
        self.pending = match self.pending {
            Some(Pending::Session(p)) if p == idx => {
                log::info!("app: chat {} deleted while a reply was pending", idx);
                Some(Pending::Orphaned)
            }
            Some(Pending::Session(p)) if p > idx => Some(Pending::Session(p - 1)),
            other => other,
        };
        true
    }

    /// Append the user's message to the current session and build the turn to run.
    pub fn submit_user_message(&mut self, text: &str) -> Result<TurnJob, SubmitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::Empty);
        }
        if self.pending.is_some() {
            return Err(SubmitError::Busy);
        }
        let session = self.conversations.current_index();
        self.conversations.append_turn(session, Turn::user(text));
        let history = &self.conversations.current().history;
        let request = TurnRequest {
            model: self.effective_model().unwrap_or_default(),
            messages: compose_messages(history, self.config.active_prefix()),
            tools_enabled: self.config.tools_enabled(),
        };
        self.pending = Some(Pending::Session(session));
        Ok(TurnJob { session, request })
    }

    /// Append the finished assistant turn to the session it was submitted from.
    /// Returns the session index, or None when there was no live pending turn.
    pub fn complete_turn(&mut self, turn: Turn) -> Option<usize> {
        match self.pending.take()? {
            Pending::Session(session) => self
                .conversations
                .append_turn(session, turn)
                .then_some(session),
            Pending::Orphaned => {
                log::debug!("app: dropping reply for deleted chat");
                None
            }
        }
    }

    /// Persist everything on exit, recording the window geometry when the front-end has one.
    pub fn shutdown(&mut self, geometry: Option<String>) {
        if geometry.is_some() {
            self.config.geometry = geometry;
        }
        self.save_config();
        self.conversations.save();
    }
}
