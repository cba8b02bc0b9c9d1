//! Reply post-processing: split a `<think>...</think>` reasoning block out of the visible text.

use regex::Regex;
use std::sync::OnceLock;

/// Visible reply text plus the extracted reasoning, if the model produced any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedReply {
    pub content: String,
    pub think_content: Option<String>,
}

const THINK_PATTERN: &str = r"(?is)<think>(.*?)</think>";

fn think_block() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| match Regex::new(THINK_PATTERN) {
        Ok(re) => Some(re),
        Err(e) => {
            log::error!("reply: reasoning pattern rejected: {}", e);
            None
        }
    })
    .as_ref()
}

/// Extract the first reasoning block (case-insensitive, multi-line) and strip every block from
/// the content. Text without a complete block is returned unchanged.
pub fn extract_reasoning(raw: &str) -> ProcessedReply {
    let Some((re, caps)) = think_block().and_then(|re| Some((re, re.captures(raw)?))) else {
        return ProcessedReply {
            content: raw.to_string(),
            think_content: None,
        };
    };
    let think = caps.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
    let content = re.replace_all(raw, "").trim().to_string();
    ProcessedReply {
        content,
        think_content: Some(think),
    }
}
