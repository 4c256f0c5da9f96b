use std::env;
use std::io;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use super::AssistantConfig;

pub(crate) const DEFAULT_WORKSPACE_DIR: &str = "./assistant";

pub(crate) fn env_required(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    let value = env::var(name).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("Missing {name}")).into());
    }
    Ok(value)
}

pub(crate) fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_u64(name: &str, default: u64) -> Result<u64, Box<dyn std::error::Error>> {
    match env_optional(name) {
        Some(value) => Ok(value
            .parse::<u64>()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid {name}")))?),
        None => Ok(default),
    }
}

pub(crate) fn env_usize(name: &str, default: usize) -> Result<usize, Box<dyn std::error::Error>> {
    match env_optional(name) {
        Some(value) => Ok(value
            .parse::<usize>()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid {name}")))?),
        None => Ok(default),
    }
}

pub(crate) fn env_f64(name: &str, default: f64) -> Result<f64, Box<dyn std::error::Error>> {
    match env_optional(name) {
        Some(value) => Ok(value
            .parse::<f64>()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid {name}")))?),
        None => Ok(default),
    }
}

pub(crate) fn is_stopword(token: &str) -> bool {
    matches!(
        token,
        "a" | "an"
            | "and"
            | "are"
            | "as"
            | "at"
            | "be"
            | "but"
            | "by"
            | "for"
            | "from"
            | "has"
            | "have"
            | "if"
            | "in"
            | "into"
            | "is"
            | "it"
            | "its"
            | "of"
            | "on"
            | "or"
            | "that"
            | "the"
            | "their"
            | "then"
            | "there"
            | "these"
            | "they"
            | "this"
            | "to"
            | "was"
            | "were"
            | "what"
            | "with"
            | "you"
            | "your"
    )
}

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

/// Split text into sentences on terminal punctuation and line breaks.
/// A terminator only closes a sentence when followed by whitespace or
/// end-of-text, so decimals and abbreviated identifiers survive intact.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\n' {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let boundary = chars.peek().map(|n| n.is_whitespace()).unwrap_or(true);
            if boundary {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

pub(crate) fn dedup_keep_order(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for v in values {
        if seen.insert(v.clone()) {
            out.push(v);
        }
    }
    out
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

pub(crate) fn jitter_ratio() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

pub(crate) fn parse_retry_after(resp: &ureq::Response) -> Option<f64> {
    resp.header("retry-after")
        .and_then(|v| v.trim().parse::<f64>().ok())
}

pub(crate) fn resolve_workspace(cli: Option<PathBuf>, config: &AssistantConfig) -> PathBuf {
    if let Some(path) = cli {
        return path;
    }
    if let Some(value) = env_optional("ADJUTANT_WORKSPACE") {
        return PathBuf::from(value);
    }
    if let Some(value) = &config.workspace {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }
    PathBuf::from(DEFAULT_WORKSPACE_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
        assert_eq!(tokenize("don't panic"), vec!["don't", "panic"]);
    }

    #[test]
    fn split_sentences_basic() {
        let out = split_sentences("First one. Second one! Third?");
        assert_eq!(out, vec!["First one.", "Second one!", "Third?"]);
    }

    #[test]
    fn split_sentences_keeps_decimals() {
        let out = split_sentences("Version 1.5 shipped. Done.");
        assert_eq!(out, vec!["Version 1.5 shipped.", "Done."]);
    }

    #[test]
    fn split_sentences_on_newlines() {
        let out = split_sentences("alpha\nbeta\n\ngamma");
        assert_eq!(out, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn truncate_chars_appends_ellipsis() {
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("abc", 6), "abc");
    }
}
