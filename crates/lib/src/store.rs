//! JSON file persistence for chat histories, plus the write helper shared with config.
//!
//! Reads never fail: a missing, empty or unparsable history file loads as an empty list, and an
//! unparsable one is copied aside first. Sessions and turns that do not decode are skipped.
//! Writes go to a temp file in the same directory and are renamed over the target.

use anyhow::Context;
use serde::Serialize;
use std::fmt::Debug;
use std::path::Path;

use serde_json::Value;

use crate::session::{derive_title, ChatSession, Role, Turn, NEW_CHAT_TITLE};

/// Write bytes to `path` via a sibling temp file and rename. Creates the parent directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating directory {}", dir.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "natter".to_string());
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
    std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("replacing {}", path.display()));
    }
    Ok(())
}

/// Load the chat history list. Missing, empty or corrupt files yield an empty list.
/// Entries that do not decode are dropped one at a time, keeping the rest of the file.
pub fn load_chat_histories(path: &Path) -> Vec<ChatSession> {
    let content = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log::warn!("store: reading chat histories {} failed: {}", path.display(), e);
            return Vec::new();
        }
    };
    let content = content.trim();
    if content.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let session = decode_session(item);
                if session.is_none() {
                    log::warn!("store: skipping invalid chat {} in {}", i, path.display());
                }
                session
            })
            .collect(),
        Ok(_) => {
            log::warn!("store: chat histories {} is not a list", path.display());
            back_up(path);
            Vec::new()
        }
        Err(e) => {
            log::warn!("store: parsing chat histories {} failed: {}", path.display(), e);
            back_up(path);
            Vec::new()
        }
    }
}

/// Decode one session, skipping turns that do not decode. Non-objects are rejected.
fn decode_session(value: Value) -> Option<ChatSession> {
    let Value::Object(mut obj) = value else {
        return None;
    };
    let history: Vec<Turn> = match obj.remove("history") {
        Some(Value::Array(turns)) => turns
            .into_iter()
            .filter_map(|t| {
                serde_json::from_value(t)
                    .map_err(|e| log::warn!("store: skipping invalid turn: {}", e))
                    .ok()
            })
            .collect(),
        _ => Vec::new(),
    };
    let title = match obj.remove("title") {
        Some(Value::String(title)) => title,
        _ => history
            .iter()
            .find(|t| t.role == Role::User)
            .map(|t| derive_title(&t.content))
            .unwrap_or_else(|| NEW_CHAT_TITLE.to_string()),
    };
    Some(ChatSession {
        title,
        history,
        extra: obj,
    })
}

/// Copy an unreadable file to `<name>.bak` before it gets overwritten.
fn back_up(path: &Path) {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");
    match std::fs::copy(path, &backup) {
        Ok(_) => log::warn!("store: kept a copy at {}", Path::new(&backup).display()),
        Err(e) => log::warn!("store: could not back up {}: {}", path.display(), e),
    }
}

/// Save the chat history list. Any value that fails to serialize is stored as its string form.
pub fn save_chat_histories(path: &Path, sessions: &[ChatSession]) -> anyhow::Result<()> {
    let safe: Vec<serde_json::Value> = sessions.iter().map(session_json).collect();
    let json = serde_json::to_vec_pretty(&safe)?;
    write_atomic(path, &json)
}

fn session_json(session: &ChatSession) -> serde_json::Value {
    let mut obj = session.extra.clone();
    obj.insert("title".to_string(), json_safe(&session.title));
    obj.insert(
        "history".to_string(),
        serde_json::Value::Array(session.history.iter().map(turn_json).collect()),
    );
    serde_json::Value::Object(obj)
}

fn turn_json(turn: &Turn) -> serde_json::Value {
    let mut obj = turn.extra.clone();
    obj.insert("role".to_string(), json_safe(&turn.role));
    obj.insert("content".to_string(), json_safe(&turn.content));
    if let Some(think) = &turn.think_content {
        obj.insert("think_content".to_string(), json_safe(think));
    }
    serde_json::Value::Object(obj)
}

/// Serialize a value, falling back to its debug string when serialization fails.
pub fn json_safe<T: Serialize + Debug + ?Sized>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        log::warn!("store: coercing unserializable value to string: {}", e);
        serde_json::Value::String(format!("{:?}", value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("natter-store-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[derive(Debug)]
    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("no"))
        }
    }

    #[test]
    fn json_safe_coerces_failures_to_strings() {
        assert_eq!(json_safe(&Unserializable), serde_json::json!("Unserializable"));
        assert_eq!(json_safe("plain"), serde_json::json!("plain"));
    }

    #[test]
    fn missing_empty_and_corrupt_files_load_empty() {
        let path = temp_file("chat_histories.json");
        assert!(load_chat_histories(&path).is_empty());
        std::fs::write(&path, b"   \n").unwrap();
        assert!(load_chat_histories(&path).is_empty());
        std::fs::write(&path, b"[{\"title\": ").unwrap();
        assert!(load_chat_histories(&path).is_empty());
    }

    #[test]
    fn corrupt_file_is_backed_up() {
        let path = temp_file("chat_histories.json");
        std::fs::write(&path, b"[{\"title\": ").unwrap();
        assert!(load_chat_histories(&path).is_empty());
        let backup = path.with_file_name("chat_histories.json.bak");
        assert_eq!(std::fs::read(backup).unwrap(), b"[{\"title\": ");
    }

    #[test]
    fn odd_turns_and_sessions_are_skipped_individually() {
        let path = temp_file("chat_histories.json");
        std::fs::write(
            &path,
            br#"[
                {"title": "Kept", "history": [
                    {"role": "user", "content": "hi"},
                    {"role": "system", "content": "legacy"},
                    {"role": "assistant", "content": "hello"}
                ]},
                "not a chat",
                {"history": [{"role": "user", "content": "no title here"}]}
            ]"#,
        )
        .unwrap();

        let sessions = load_chat_histories(&path);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].title, "Kept");
        let contents: Vec<&str> = sessions[0].history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello"]);
        assert_eq!(sessions[1].title, "no title here");
        assert!(!path.with_file_name("chat_histories.json.bak").exists());
    }

    #[test]
    fn legacy_fields_survive_a_rewrite() {
        let path = temp_file("chat_histories.json");
        std::fs::write(
            &path,
            br#"[{"title": "t", "history": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "yo", "think_content": null, "last_json": {"request": null}}
            ]}]"#,
        )
        .unwrap();
        let sessions = load_chat_histories(&path);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].history[1].think_content, None);
        assert!(sessions[0].history[1].extra.contains_key("last_json"));

        save_chat_histories(&path, &sessions).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["history"][1]["last_json"], serde_json::json!({"request": null}));
        assert_eq!(load_chat_histories(&path), sessions);
    }

    #[test]
    fn write_atomic_creates_parent_and_leaves_no_temp_files() {
        let path = temp_file("nested/dir/out.json");
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        let leftovers = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
