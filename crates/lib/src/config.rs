//! Configuration types and loading.
//!
//! Config is a single JSON object (e.g. `~/.natter/client_config.json`) holding the selected
//! model, window geometry, profiles, the selected profile index and the free-text tools flag.
//! Unknown keys are kept so rewriting the file never drops them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::store;

pub const CONFIG_FILE_NAME: &str = "client_config.json";
pub const HISTORY_FILE_NAME: &str = "chat_histories.json";
pub const DEFAULT_PREFIX: &str = "You are a helpful assistant.";
const DEFAULT_PROFILE_NAME: &str = "Default";
const NEW_PROFILE_NAME: &str = "New Profile";

/// A named system-instruction preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub prefix: String,
}

impl Profile {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new(DEFAULT_PROFILE_NAME, DEFAULT_PREFIX)
    }
}

/// Top-level application config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Saved window geometry (front-end specific encoding).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,

    /// Exact model name as listed by `ollama list` (e.g. "qwen3:8b").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,

    #[serde(default)]
    pub profiles: Vec<Profile>,

    #[serde(default)]
    pub selected_profile_idx: usize,

    /// Free-text flag: any non-blank value advertises the built-in tools to the model.
    #[serde(default)]
    pub tools: String,

    /// Legacy single system prefix, superseded by profiles. Only read when no profiles exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prefix: Option<String>,

    /// Ollama base URL. Overridden by OLLAMA_HOST env.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Config {
    /// Build a config from a JSON object one key at a time. A known key with an unusable value
    /// falls back to that key's default; the other keys are unaffected. Unknown keys go to `extra`.
    pub fn from_json_object(mut obj: Map<String, Value>) -> Self {
        let geometry = take_field(&mut obj, "geometry");
        let selected_model = take_field(&mut obj, "selected_model");
        let profiles = take_profiles(&mut obj);
        let selected_profile_idx = take_index(&mut obj, "selected_profile_idx");
        let tools = take_text(&mut obj, "tools");
        let system_prefix = take_field(&mut obj, "system_prefix");
        let host = take_field(&mut obj, "host");
        Self {
            geometry,
            selected_model,
            profiles,
            selected_profile_idx,
            tools,
            system_prefix,
            host,
            extra: obj,
        }
    }

    /// Fill in the default profile (migrating a legacy `system_prefix`) and clamp the selection.
    pub fn normalize(&mut self) {
        if self.profiles.is_empty() {
            let prefix = self
                .system_prefix
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
            self.profiles.push(Profile::new(DEFAULT_PROFILE_NAME, prefix));
        }
        if self.selected_profile_idx >= self.profiles.len() {
            log::debug!(
                "config: selected profile {} out of range, resetting to 0",
                self.selected_profile_idx
            );
            self.selected_profile_idx = 0;
        }
    }

    pub fn tools_enabled(&self) -> bool {
        !self.tools.trim().is_empty()
    }

    /// The active profile. Falls back to the first one when the index is stale.
    pub fn selected_profile(&self) -> Option<&Profile> {
        self.profiles
            .get(self.selected_profile_idx)
            .or_else(|| self.profiles.first())
    }

    /// Instruction text of the active profile.
    pub fn active_prefix(&self) -> &str {
        self.selected_profile()
            .map(|p| p.prefix.as_str())
            .unwrap_or(DEFAULT_PREFIX)
    }

    /// Append a new profile with placeholder values; returns its index.
    pub fn add_profile(&mut self) -> usize {
        self.profiles.push(Profile::new(NEW_PROFILE_NAME, DEFAULT_PREFIX));
        self.profiles.len() - 1
    }

    /// Edit a profile in place. A blank name becomes "Profile". Returns false when idx is out of range.
    pub fn update_profile(&mut self, idx: usize, name: &str, prefix: &str) -> bool {
        let Some(profile) = self.profiles.get_mut(idx) else {
            return false;
        };
        let name = name.trim();
        profile.name = if name.is_empty() {
            "Profile".to_string()
        } else {
            name.to_string()
        };
        profile.prefix = prefix.to_string();
        true
    }

    /// Select a profile by index; out-of-range indices are ignored.
    pub fn select_profile(&mut self, idx: usize) -> bool {
        if idx >= self.profiles.len() {
            return false;
        }
        self.selected_profile_idx = idx;
        true
    }

    /// Remove a profile. The last remaining profile cannot be removed.
    pub fn remove_profile(&mut self, idx: usize) -> bool {
        if idx >= self.profiles.len() || self.profiles.len() == 1 {
            return false;
        }
        self.profiles.remove(idx);
        if self.selected_profile_idx > idx {
            self.selected_profile_idx -= 1;
        } else if self.selected_profile_idx >= self.profiles.len() {
            self.selected_profile_idx = self.profiles.len() - 1;
        }
        true
    }
}

fn take_field<T: DeserializeOwned>(obj: &mut Map<String, Value>, key: &str) -> Option<T> {
    match obj.remove(key)? {
        Value::Null => None,
        value => serde_json::from_value(value)
            .map_err(|e| log::warn!("config: ignoring invalid {}: {}", key, e))
            .ok(),
    }
}

/// Profiles that fail to decode are skipped individually.
fn take_profiles(obj: &mut Map<String, Value>) -> Vec<Profile> {
    match obj.remove("profiles") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| {
                serde_json::from_value(item)
                    .map_err(|e| log::warn!("config: skipping invalid profile {}: {}", i, e))
                    .ok()
            })
            .collect(),
        Some(other) => {
            log::warn!("config: ignoring profiles, expected a list: {}", other);
            Vec::new()
        }
    }
}

/// Non-negative integers are kept; anything else (negative, fractional, text) becomes 0.
fn take_index(obj: &mut Map<String, Value>, key: &str) -> usize {
    match obj.remove(key) {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) if n.as_u64().is_some() => {
            n.as_u64().and_then(|v| usize::try_from(v).ok()).unwrap_or(0)
        }
        Some(other) => {
            log::warn!("config: invalid {} {}, using 0", key, other);
            0
        }
    }
}

/// Free text. Scalars are kept as their text (`false` as blank); lists and objects are dropped.
fn take_text(obj: &mut Map<String, Value>, key: &str) -> String {
    match obj.remove(key) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => String::new(),
        Some(Value::String(s)) => s,
        Some(Value::Bool(true)) => "true".to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => {
            log::warn!("config: invalid {} {}, leaving it blank", key, other);
            String::new()
        }
    }
}

/// Directory holding the config and chat history: NATTER_HOME, else ~/.natter.
pub fn data_dir() -> PathBuf {
    std::env::var("NATTER_HOME")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".natter"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("NATTER_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir().join(CONFIG_FILE_NAME))
}

/// Chat history file next to the config file.
pub fn history_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join(HISTORY_FILE_NAME)
}

/// Resolve the Ollama base URL: env OLLAMA_HOST overrides config.
pub fn resolve_host(config: &Config) -> Option<String> {
    std::env::var("OLLAMA_HOST")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .host
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Load config from the given path (or the default). A missing file or one that is not a JSON
/// object yields defaults; individual bad keys only reset themselves.
/// Returns the normalized config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> (Config, PathBuf) {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = match std::fs::read_to_string(&path) {
        Ok(s) if s.trim().is_empty() => Config::default(),
        Ok(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(obj)) => Config::from_json_object(obj),
            Ok(_) => {
                log::warn!("config: {} is not a JSON object, using defaults", path.display());
                Config::default()
            }
            Err(e) => {
                log::warn!("config: parsing {} failed, using defaults: {}", path.display(), e);
                Config::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("config file not found, using defaults: {}", path.display());
            Config::default()
        }
        Err(e) => {
            log::warn!("config: reading {} failed, using defaults: {}", path.display(), e);
            Config::default()
        }
    };
    config.normalize();
    (config, path)
}

/// Overwrite the config file (write to a temp file, then rename).
pub fn save_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(config)?;
    store::write_atomic(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("natter-config-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn normalize_adds_default_profile() {
        let mut config = Config::default();
        config.normalize();
        assert_eq!(config.profiles, vec![Profile::default()]);
        assert_eq!(config.selected_profile_idx, 0);
        assert_eq!(config.active_prefix(), DEFAULT_PREFIX);
    }

    #[test]
    fn normalize_migrates_legacy_system_prefix() {
        let mut config: Config =
            serde_json::from_str(r#"{"system_prefix": "Answer in French."}"#).unwrap();
        config.normalize();
        assert_eq!(config.profiles.len(), 1);
        assert_eq!(config.active_prefix(), "Answer in French.");
    }

    #[test]
    fn normalize_clamps_selected_index() {
        let mut config: Config = serde_json::from_str(
            r#"{"profiles": [{"name": "A", "prefix": "a"}], "selected_profile_idx": 7}"#,
        )
        .unwrap();
        config.normalize();
        assert_eq!(config.selected_profile_idx, 0);
        assert_eq!(config.active_prefix(), "a");
    }

    #[test]
    fn tools_flag_is_free_text() {
        let mut config = Config::default();
        assert!(!config.tools_enabled());
        config.tools = "   ".to_string();
        assert!(!config.tools_enabled());
        config.tools = "yes please".to_string();
        assert!(config.tools_enabled());
    }

    #[test]
    fn update_profile_defaults_blank_name() {
        let mut config = Config::default();
        config.normalize();
        assert!(config.update_profile(0, "   ", "Be terse."));
        assert_eq!(config.profiles[0], Profile::new("Profile", "Be terse."));
        assert!(!config.update_profile(3, "x", "y"));
    }

    #[test]
    fn remove_profile_keeps_one_and_reclamps() {
        let mut config = Config::default();
        config.normalize();
        let idx = config.add_profile();
        assert_eq!(idx, 1);
        assert!(config.select_profile(1));
        assert!(config.remove_profile(1));
        assert_eq!(config.selected_profile_idx, 0);
        assert!(!config.remove_profile(0));
        assert_eq!(config.profiles.len(), 1);
    }

    #[test]
    fn remove_profile_before_selection_shifts_index() {
        let mut config = Config::default();
        config.normalize();
        config.add_profile();
        config.add_profile();
        config.select_profile(2);
        assert!(config.remove_profile(0));
        assert_eq!(config.selected_profile_idx, 1);
    }

    #[test]
    fn select_profile_ignores_out_of_range() {
        let mut config = Config::default();
        config.normalize();
        assert!(!config.select_profile(5));
        assert_eq!(config.selected_profile_idx, 0);
    }

    #[test]
    fn history_path_is_next_to_config() {
        assert_eq!(
            history_path(Path::new("/home/user/.natter/client_config.json")),
            PathBuf::from("/home/user/.natter/chat_histories.json")
        );
        assert_eq!(
            history_path(Path::new("client_config.json")),
            PathBuf::from("./chat_histories.json")
        );
    }

    #[test]
    fn load_missing_or_corrupt_file_yields_defaults() {
        let dir = temp_dir();
        let path = dir.join(CONFIG_FILE_NAME);
        let (config, used) = load_config(Some(path.clone()));
        assert_eq!(used, path);
        assert_eq!(config.profiles.len(), 1);

        std::fs::write(&path, b"{ not json").unwrap();
        let (config, _) = load_config(Some(path));
        assert_eq!(config.selected_profile_idx, 0);
        assert_eq!(config.profiles, vec![Profile::default()]);
    }

    fn load_from(json: &str) -> Config {
        let path = temp_dir().join(CONFIG_FILE_NAME);
        std::fs::write(&path, json).unwrap();
        load_config(Some(path)).0
    }

    const TWO_PROFILES: &str =
        r#"[{"name": "A", "prefix": "a"}, {"name": "Pirate", "prefix": "Talk like a pirate."}]"#;

    #[test]
    fn negative_index_resets_only_the_index() {
        let config = load_from(&format!(
            r#"{{"profiles": {}, "selected_profile_idx": -1, "selected_model": "m"}}"#,
            TWO_PROFILES
        ));
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.profiles[1].name, "Pirate");
        assert_eq!(config.selected_profile_idx, 0);
        assert_eq!(config.selected_model.as_deref(), Some("m"));
    }

    #[test]
    fn non_integer_index_resets_only_the_index() {
        for idx in ["1.5", r#""1""#, "true"] {
            let config = load_from(&format!(
                r#"{{"profiles": {}, "selected_profile_idx": {}}}"#,
                TWO_PROFILES, idx
            ));
            assert_eq!(config.profiles.len(), 2, "index {}", idx);
            assert_eq!(config.selected_profile_idx, 0, "index {}", idx);
        }
    }

    #[test]
    fn non_string_tools_keeps_profiles() {
        let config = load_from(&format!(
            r#"{{"profiles": {}, "selected_profile_idx": 1, "tools": true, "theme": "dark"}}"#,
            TWO_PROFILES
        ));
        assert_eq!(config.profiles.len(), 2);
        assert_eq!(config.selected_profile_idx, 1);
        assert_eq!(config.active_prefix(), "Talk like a pirate.");
        assert!(config.tools_enabled());
        assert_eq!(config.extra.get("theme").and_then(|v| v.as_str()), Some("dark"));

        let config = load_from(r#"{"tools": false}"#);
        assert!(!config.tools_enabled());
        let config = load_from(r#"{"tools": ["x"]}"#);
        assert!(!config.tools_enabled());
    }

    #[test]
    fn invalid_profile_entries_are_skipped() {
        let config = load_from(
            r#"{"profiles": [{"name": "A", "prefix": "a"}, 42, {"name": "B"}], "selected_model": 3}"#,
        );
        assert_eq!(config.profiles, vec![Profile::new("A", "a")]);
        assert_eq!(config.selected_model, None);
    }

    #[test]
    fn non_object_json_yields_defaults() {
        let config = load_from("[1, 2]");
        assert_eq!(config.profiles, vec![Profile::default()]);
    }

    #[test]
    fn save_then_load_preserves_unknown_keys() {
        let dir = temp_dir();
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            br#"{"selected_model": "llama3.2:latest", "theme": "dark", "tools": "on"}"#,
        )
        .unwrap();
        let (mut config, _) = load_config(Some(path.clone()));
        assert_eq!(config.selected_model.as_deref(), Some("llama3.2:latest"));
        config.geometry = Some("1200x800".to_string());
        save_config(&config, &path).unwrap();

        let (reloaded, _) = load_config(Some(path));
        assert_eq!(reloaded, config);
        assert_eq!(
            reloaded.extra.get("theme").and_then(|v| v.as_str()),
            Some("dark")
        );
        assert!(reloaded.tools_enabled());
    }
}
